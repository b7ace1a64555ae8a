//! Per-type state logic.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use waypoint_asl::{
  ChoiceState, DataPaths, ErrorName, MapState, ParallelState, PassState, ResultHandling, SucceedState,
  TaskState, Timestamp, Transition, WaitDuration, WaitState,
};
use waypoint_path::{ContextObject, unjoin};
use waypoint_task::TaskError;

use crate::context;
use crate::error::{Halt, StatesError};
use crate::events::ExecutionNotifier;
use crate::fanout::Job;
use crate::filter;
use crate::payload;
use crate::runtime::{Runtime, Scope, Step};

fn step(transition: &Transition, output: Value) -> Step {
  match transition {
    Transition::Next(next) => Step::Next {
      next: next.clone(),
      output,
    },
    Transition::End => Step::End(output),
  }
}

fn runtime_error(cause: impl std::fmt::Display) -> Halt {
  Halt::Error(StatesError::new(ErrorName::Runtime, cause))
}

fn until(timestamp: &Timestamp) -> Duration {
  (timestamp.as_datetime() - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// The tail of the data flow shared by Pass, Task, Parallel and Map.
struct Completion<'a> {
  paths: &'a DataPaths,
  handling: &'a ResultHandling,
  result_selector: Option<&'a Value>,
  transition: &'a Transition,
}

impl<N: ExecutionNotifier + 'static> Runtime<N> {
  fn effective_input(&self, paths: &DataPaths, context: &ContextObject, input: &Value) -> Result<Value, Halt> {
    Ok(filter::select(
      "InputPath",
      paths.input_path.as_ref(),
      context,
      input.clone(),
    )?)
  }

  fn parameterize(
    &self,
    handling: &ResultHandling,
    context: &ContextObject,
    effective: Value,
  ) -> Result<Value, Halt> {
    match &handling.parameters {
      Some(template) => Ok(payload::resolve(
        template,
        context,
        &effective,
        &self.config.intrinsics,
        &ErrorName::ParameterPathFailure,
      )?),
      None => Ok(effective),
    }
  }

  /// ResultSelector, then ResultPath into the raw input, then OutputPath.
  fn complete(
    &self,
    completion: Completion<'_>,
    context: &ContextObject,
    raw_input: Value,
    result: Value,
  ) -> Result<Step, Halt> {
    let result = match completion.result_selector {
      Some(template) => payload::resolve(
        template,
        context,
        &result,
        &self.config.intrinsics,
        &ErrorName::ParameterPathFailure,
      )?,
      None => result,
    };
    let joined = filter::merge(completion.handling.result_path.as_ref(), context, raw_input, result)?;
    let output = filter::select(
      "OutputPath",
      completion.paths.output_path.as_ref(),
      context,
      joined,
    )?;
    Ok(step(completion.transition, output))
  }

  pub(crate) fn run_pass(&self, pass: &PassState, input: Value, context: &ContextObject) -> Result<Step, Halt> {
    let effective = self.effective_input(&pass.paths, context, &input)?;
    let result = match &pass.result {
      Some(result) => result.clone(),
      None => self.parameterize(&pass.handling, context, effective)?,
    };
    self.complete(
      Completion {
        paths: &pass.paths,
        handling: &pass.handling,
        result_selector: None,
        transition: &pass.transition,
      },
      context,
      input,
      result,
    )
  }

  pub(crate) async fn run_task(
    &self,
    task: &TaskState,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    let effective = self.effective_input(&task.paths, context, &input)?;
    let task_input = self.parameterize(&task.handling, context, effective)?;

    let call = self.config.tasks.execute(
      &task.resource.resource_type,
      &task.resource.path,
      task_input,
      scope.cancel.child_token(),
    );
    let outcome = if task.timeout_seconds > 0 {
      match tokio::time::timeout(Duration::from_secs(task.timeout_seconds), call).await {
        Ok(outcome) => outcome,
        Err(_) => {
          return Err(Halt::Error(StatesError::new(
            ErrorName::Timeout,
            format!("task '{}' timed out after {}s", task.resource, task.timeout_seconds),
          )));
        }
      }
    } else {
      call.await
    };

    let result = match outcome {
      Ok(result) => result,
      Err(TaskError::Cancelled) => return Err(Halt::Cancelled),
      Err(TaskError::Failed {
        error: Some(name),
        cause,
      }) => return Err(Halt::Error(StatesError::new(ErrorName::from_name(&name), cause))),
      Err(e) => return Err(Halt::Error(StatesError::new(ErrorName::TaskFailed, e))),
    };

    self.complete(
      Completion {
        paths: &task.paths,
        handling: &task.handling,
        result_selector: task.recovery.result_selector.as_ref(),
        transition: &task.transition,
      },
      context,
      input,
      result,
    )
  }

  pub(crate) fn run_choice(
    &self,
    choice: &ChoiceState,
    input: Value,
    context: &ContextObject,
  ) -> Result<Step, Halt> {
    let effective = self.effective_input(&choice.paths, context, &input)?;

    let mut target = None;
    for rule in &choice.choices {
      if rule.condition.evaluate(context, &effective).map_err(runtime_error)? {
        target = Some(&rule.next);
        break;
      }
    }

    let next = match target.or(choice.default.as_ref()) {
      Some(next) => next.clone(),
      None => {
        return Err(Halt::Error(StatesError::new(
          ErrorName::NoChoiceMatched,
          format!("no choice rule of '{}' matched and no Default is set", choice.name),
        )));
      }
    };
    debug!(state = %choice.name, next = %next, "choice selected");

    let output = filter::select("OutputPath", choice.paths.output_path.as_ref(), context, effective)?;
    Ok(Step::Next { next, output })
  }

  pub(crate) async fn run_wait(
    &self,
    wait: &WaitState,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    let effective = self.effective_input(&wait.paths, context, &input)?;

    let duration = match &wait.duration {
      WaitDuration::Seconds(seconds) => Duration::from_secs(*seconds),
      WaitDuration::Timestamp(timestamp) => until(timestamp),
      WaitDuration::SecondsPath(path) => {
        let value = unjoin(context, &effective, path.as_path()).map_err(runtime_error)?;
        let seconds = value
          .as_u64()
          .ok_or_else(|| runtime_error(format!("SecondsPath value {} is not a non-negative integer", value)))?;
        Duration::from_secs(seconds)
      }
      WaitDuration::TimestampPath(path) => {
        let value = unjoin(context, &effective, path.as_path()).map_err(runtime_error)?;
        let timestamp = value
          .as_str()
          .and_then(|text| Timestamp::parse(text).ok())
          .ok_or_else(|| runtime_error(format!("TimestampPath value {} is not a timestamp", value)))?;
        until(&timestamp)
      }
    };

    debug!(state = %wait.name, wait_ms = duration.as_millis() as u64, "waiting");
    tokio::select! {
      _ = tokio::time::sleep(duration) => {}
      _ = scope.cancel.cancelled() => return Err(Halt::Cancelled),
    }

    let output = filter::select("OutputPath", wait.paths.output_path.as_ref(), context, effective)?;
    Ok(step(&wait.transition, output))
  }

  pub(crate) fn run_succeed(
    &self,
    succeed: &SucceedState,
    input: Value,
    context: &ContextObject,
  ) -> Result<Step, Halt> {
    let effective = self.effective_input(&succeed.paths, context, &input)?;
    let output = filter::select("OutputPath", succeed.paths.output_path.as_ref(), context, effective)?;
    Ok(Step::End(output))
  }

  pub(crate) async fn run_parallel(
    &self,
    parallel: &ParallelState,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    let effective = self.effective_input(&parallel.paths, context, &input)?;
    let branch_input = self.parameterize(&parallel.handling, context, effective)?;

    let jobs = parallel
      .branches
      .iter()
      .map(|branch| Job {
        workflow: branch.clone(),
        input: branch_input.clone(),
        context: context.clone(),
      })
      .collect();
    let results = self.fan_out(jobs, 0, scope).await?;

    self.complete(
      Completion {
        paths: &parallel.paths,
        handling: &parallel.handling,
        result_selector: parallel.recovery.result_selector.as_ref(),
        transition: &parallel.transition,
      },
      context,
      input,
      Value::Array(results),
    )
  }

  pub(crate) async fn run_map(
    &self,
    map: &MapState,
    input: Value,
    context: &ContextObject,
    scope: &Scope,
  ) -> Result<Step, Halt> {
    let effective = self.effective_input(&map.paths, context, &input)?;

    let items = match unjoin(context, &effective, map.items_path.as_path()).map_err(runtime_error)? {
      Value::Array(items) => items,
      other => {
        return Err(runtime_error(format!(
          "ItemsPath '{}' selected {}, expected an array",
          map.items_path.as_path(),
          other
        )));
      }
    };

    let mut jobs = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
      let item_context = context::for_map_item(context, index, &item);
      let item_input = match &map.handling.parameters {
        Some(template) => payload::resolve(
          template,
          &item_context,
          &effective,
          &self.config.intrinsics,
          &ErrorName::ParameterPathFailure,
        )?,
        None => item,
      };
      jobs.push(Job {
        workflow: map.iterator.clone(),
        input: item_input,
        context: item_context,
      });
    }
    let results = self.fan_out(jobs, map.max_concurrency, scope).await?;

    self.complete(
      Completion {
        paths: &map.paths,
        handling: &map.handling,
        result_selector: map.recovery.result_selector.as_ref(),
        transition: &map.transition,
      },
      context,
      input,
      Value::Array(results),
    )
  }
}
