//! Workflow runtime.
//!
//! [`Runtime::execute`] drives an input through a compiled workflow: look
//! up the current state, run it, follow its transition, and stop at a
//! Succeed state, an `End` transition, a Fail state, or an error no
//! catcher handles.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use waypoint_asl::{Recovery, State, Workflow};
use waypoint_path::ContextObject;

use crate::config::RuntimeConfig;
use crate::context;
use crate::error::{ExecutionError, Halt};
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::filter;
use crate::result::{ExecutionResult, ExecutionStatus};

/// What a state hands back to the run loop.
#[derive(Debug)]
pub(crate) enum Step {
  Next { next: String, output: Value },
  End(Value),
}

impl Step {
  fn output(&self) -> &Value {
    match self {
      Step::Next { output, .. } => output,
      Step::End(output) => output,
    }
  }
}

/// Per-execution values shared by every state, including those in
/// Parallel branches and Map iterations.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
  pub execution_id: Arc<str>,
  pub cancel: CancellationToken,
}

/// The workflow runtime.
///
/// Generic over `N: ExecutionNotifier`. Use [`Runtime::new`] for a runtime
/// that discards events, or [`Runtime::with_notifier`] to observe them.
/// Cloning is cheap; clones share configuration and notifier.
pub struct Runtime<N: ExecutionNotifier = NoopNotifier> {
  pub(crate) config: RuntimeConfig,
  pub(crate) notifier: Arc<N>,
}

impl<N: ExecutionNotifier> Clone for Runtime<N> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      notifier: self.notifier.clone(),
    }
  }
}

impl Runtime<NoopNotifier> {
  /// Create a runtime with no-op notifications.
  pub fn new(config: RuntimeConfig) -> Self {
    Self::with_notifier(config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier + 'static> Runtime<N> {
  /// Create a runtime with a custom notifier.
  pub fn with_notifier(config: RuntimeConfig, notifier: N) -> Self {
    Self {
      config,
      notifier: Arc::new(notifier),
    }
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Execute `workflow` with `input`.
  ///
  /// Reaching a Fail state is a normal return with a
  /// [`ExecutionStatus::Failed`] status. Errors are reserved for runs that
  /// were cancelled, timed out, or raised an error no catcher handled.
  #[instrument(
    name = "runtime_execute",
    skip(self, workflow, input, cancel),
    fields(start_at = %workflow.start_at())
  )]
  pub async fn execute(
    &self,
    workflow: Arc<Workflow>,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<ExecutionResult, ExecutionError> {
    let execution_id = uuid::Uuid::new_v4().to_string();

    info!(execution_id = %execution_id, input = %input, "execution_started");
    self.notifier.notify(ExecutionEvent::ExecutionStarted {
      execution_id: execution_id.clone(),
      start_at: workflow.start_at().to_string(),
    });

    let context = context::for_execution(&execution_id, &input);
    let token = cancel.child_token();
    let scope = Scope {
      execution_id: Arc::from(execution_id.as_str()),
      cancel: token.clone(),
    };

    let start_at = workflow.start_at().to_string();
    let run = self.run_workflow(workflow.clone(), input, context, scope);
    let outcome = match self.time_limit(&workflow) {
      Some(limit) => match tokio::time::timeout(limit, run).await {
        Ok(outcome) => outcome,
        Err(_) => {
          token.cancel();
          let err = ExecutionError::TimedOut {
            seconds: limit.as_secs(),
          };
          self.fail(&execution_id, &err.to_string());
          return Err(err);
        }
      },
      None => run.await,
    };

    let result = match outcome {
      Ok(output) => Ok(ExecutionResult {
        execution_id: execution_id.clone(),
        status: ExecutionStatus::Succeeded,
        output,
      }),
      Err(Halt::FailState { error, cause }) => Ok(ExecutionResult {
        execution_id: execution_id.clone(),
        status: ExecutionStatus::Failed { error, cause },
        output: Value::Null,
      }),
      Err(Halt::Unhandled { state, error }) => Err(ExecutionError::StateFailed { state, error }),
      Err(Halt::Error(error)) => Err(ExecutionError::StateFailed {
        state: start_at,
        error,
      }),
      Err(Halt::StateNotFound(state)) => Err(ExecutionError::StateNotFound { state }),
      Err(Halt::Cancelled) => Err(ExecutionError::Cancelled),
    };

    match &result {
      Ok(ExecutionResult {
        status: ExecutionStatus::Succeeded,
        output,
        ..
      }) => {
        info!(execution_id = %execution_id, output = %output, "execution_succeeded");
        self.notifier.notify(ExecutionEvent::ExecutionSucceeded {
          execution_id: execution_id.clone(),
          output: output.clone(),
        });
      }
      Ok(ExecutionResult {
        status: ExecutionStatus::Failed { error, cause },
        ..
      }) => {
        let message = format!(
          "{}: {}",
          error.as_deref().unwrap_or_default(),
          cause.as_deref().unwrap_or_default()
        );
        self.fail(&execution_id, &message);
      }
      Err(e) => self.fail(&execution_id, &e.to_string()),
    }

    result
  }

  fn fail(&self, execution_id: &str, message: &str) {
    error!(execution_id = %execution_id, error = %message, "execution_failed");
    self.notifier.notify(ExecutionEvent::ExecutionFailed {
      execution_id: execution_id.to_string(),
      error: message.to_string(),
    });
  }

  /// The tighter of the workflow's `TimeoutSeconds` and the configured
  /// timeout.
  fn time_limit(&self, workflow: &Workflow) -> Option<Duration> {
    let declared = (workflow.timeout_seconds() > 0).then(|| Duration::from_secs(workflow.timeout_seconds()));
    match (declared, self.config.timeout) {
      (Some(a), Some(b)) => Some(a.min(b)),
      (a, b) => a.or(b),
    }
  }

  /// Run a workflow (top-level or nested) to its end.
  pub(crate) fn run_workflow(
    &self,
    workflow: Arc<Workflow>,
    input: Value,
    context: ContextObject,
    scope: Scope,
  ) -> BoxFuture<'static, Result<Value, Halt>> {
    let runtime = self.clone();
    async move {
      let mut name = workflow.start_at().to_string();
      let mut input = input;
      loop {
        if scope.cancel.is_cancelled() {
          warn!(execution_id = %scope.execution_id, state = %name, "execution cancelled");
          return Err(Halt::Cancelled);
        }

        let state = workflow
          .state(&name)
          .ok_or_else(|| Halt::StateNotFound(name.clone()))?;

        match runtime.run_state(state, input, &context, &scope).await {
          Ok(Step::Next { next, output }) => {
            name = next;
            input = output;
          }
          Ok(Step::End(output)) => return Ok(output),
          Err(Halt::Error(error)) => return Err(Halt::Unhandled { state: name, error }),
          Err(other) => return Err(other),
        }
      }
    }
    .boxed()
  }

  async fn run_state(
    &self,
    state: &State,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    info!(
      execution_id = %scope.execution_id,
      state = %state.name(),
      state_type = %state.kind(),
      "state_entered"
    );
    self.notifier.notify(ExecutionEvent::StateEntered {
      execution_id: scope.execution_id.to_string(),
      state: state.name().to_string(),
      input: input.clone(),
    });

    let result = match state.recovery() {
      Some(recovery) if !recovery.retry.is_empty() || !recovery.catch.is_empty() => {
        self.run_with_recovery(state, recovery, input, context, scope).await
      }
      _ => {
        let state_context = context::enter_state(context, state.name(), 0);
        self.attempt(state, input, &state_context, scope).await
      }
    };

    match &result {
      Ok(step) => {
        info!(
          execution_id = %scope.execution_id,
          state = %state.name(),
          output = %step.output(),
          "state_completed"
        );
        self.notifier.notify(ExecutionEvent::StateExited {
          execution_id: scope.execution_id.to_string(),
          state: state.name().to_string(),
          output: step.output().clone(),
        });
      }
      Err(Halt::Error(e)) => {
        error!(execution_id = %scope.execution_id, state = %state.name(), error = %e, "state_failed");
      }
      Err(_) => {}
    }

    result
  }

  /// Runs a state under its Retry and Catch policies.
  ///
  /// The first retrier whose `ErrorEquals` matches owns the error; each
  /// retrier counts its own attempts. Once retries are exhausted (or none
  /// match) the first matching catcher routes to its `Next`.
  async fn run_with_recovery(
    &self,
    state: &State,
    recovery: &Recovery,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    let mut attempts = vec![0u32; recovery.retry.len()];
    let mut retry_count = 0u32;

    loop {
      let state_context = context::enter_state(context, state.name(), retry_count);
      let error = match self.attempt(state, input.clone(), &state_context, scope).await {
        Err(Halt::Error(error)) => error,
        other => return other,
      };

      if let Some(index) = recovery.retry.iter().position(|r| r.matches(&error.name)) {
        let retrier = &recovery.retry[index];
        if attempts[index] < retrier.max_attempts {
          let delay = retrier.delay(attempts[index]);
          let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
          attempts[index] += 1;
          retry_count += 1;

          warn!(
            execution_id = %scope.execution_id,
            state = %state.name(),
            attempt = retry_count,
            delay_ms,
            error = %error,
            "state_retrying"
          );
          self.notifier.notify(ExecutionEvent::StateRetried {
            execution_id: scope.execution_id.to_string(),
            state: state.name().to_string(),
            error: error.to_string(),
            attempt: retry_count,
            delay_ms,
          });

          tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = scope.cancel.cancelled() => return Err(Halt::Cancelled),
          }
          continue;
        }
      }

      if let Some(catcher) = recovery.catch.iter().find(|c| c.matches(&error.name)) {
        warn!(
          execution_id = %scope.execution_id,
          state = %state.name(),
          next = %catcher.next,
          error = %error,
          "state_caught"
        );
        self.notifier.notify(ExecutionEvent::StateCaught {
          execution_id: scope.execution_id.to_string(),
          state: state.name().to_string(),
          error: error.to_string(),
          next: catcher.next.clone(),
        });

        let output = filter::merge(catcher.result_path.as_ref(), context, input, error.to_output())?;
        return Ok(Step::Next {
          next: catcher.next.clone(),
          output,
        });
      }

      return Err(Halt::Error(error));
    }
  }

  /// One run of a state's filters and logic.
  async fn attempt(
    &self,
    state: &State,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    match state {
      State::Pass(pass) => self.run_pass(pass, input, context),
      State::Task(task) => self.run_task(task, input, context, scope).await,
      State::Choice(choice) => self.run_choice(choice, input, context),
      State::Wait(wait) => self.run_wait(wait, input, context, scope).await,
      State::Succeed(succeed) => self.run_succeed(succeed, input, context),
      State::Fail(fail) => Err(Halt::FailState {
        error: fail.error.clone(),
        cause: fail.cause.clone(),
      }),
      State::Parallel(parallel) => self.run_parallel(parallel, input, context, scope).await,
      State::Map(map) => self.run_map(map, input, context, scope).await,
    }
  }
}
