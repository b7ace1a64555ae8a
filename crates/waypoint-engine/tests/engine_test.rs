//! End-to-end tests for Runtime::execute.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use waypoint_asl::{ErrorName, Workflow, compile_value};
use waypoint_engine::{
  ChannelNotifier, ExecutionError, ExecutionEvent, ExecutionResult, ExecutionStatus, Runtime, RuntimeConfig,
};
use waypoint_task::{TaskError, TaskExecutor, TaskRegistry};

fn workflow(document: Value) -> Arc<Workflow> {
  Arc::new(compile_value(document).expect("workflow should compile"))
}

async fn run(document: Value, input: Value) -> Result<ExecutionResult, ExecutionError> {
  run_with(RuntimeConfig::default(), document, input).await
}

async fn run_with(
  config: RuntimeConfig,
  document: Value,
  input: Value,
) -> Result<ExecutionResult, ExecutionError> {
  Runtime::new(config)
    .execute(workflow(document), input, CancellationToken::new())
    .await
}

fn config_with(resource_type: &str, executor: impl TaskExecutor + 'static) -> RuntimeConfig {
  let mut tasks = TaskRegistry::new();
  tasks.register(resource_type, executor);
  RuntimeConfig {
    tasks: Arc::new(tasks),
    ..RuntimeConfig::default()
  }
}

/// Echoes its input after sleeping for `input.ms` milliseconds.
struct SleepTask {
  running: Arc<AtomicUsize>,
  peak: Arc<AtomicUsize>,
}

impl SleepTask {
  fn new() -> Self {
    Self {
      running: Arc::new(AtomicUsize::new(0)),
      peak: Arc::new(AtomicUsize::new(0)),
    }
  }
}

#[async_trait]
impl TaskExecutor for SleepTask {
  async fn execute(&self, cancel: CancellationToken, _path: &str, input: Value) -> Result<Value, TaskError> {
    let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);

    let ms = input.get("ms").and_then(Value::as_u64).unwrap_or(0);
    let outcome = tokio::select! {
      _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(input),
      _ = cancel.cancelled() => Err(TaskError::Cancelled),
    };

    self.running.fetch_sub(1, Ordering::SeqCst);
    outcome
  }
}

/// Fails with `error` until it has been called `failures` times.
struct FlakyTask {
  calls: Arc<AtomicU32>,
  failures: u32,
  error: &'static str,
}

#[async_trait]
impl TaskExecutor for FlakyTask {
  async fn execute(&self, _cancel: CancellationToken, _path: &str, input: Value) -> Result<Value, TaskError> {
    let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call <= self.failures {
      return Err(TaskError::Failed {
        error: Some(self.error.to_string()),
        cause: format!("call {}", call),
      });
    }
    Ok(json!({ "calls": call, "input": input }))
  }
}

#[tokio::test]
async fn test_pass_passes_input_through() {
  let result = run(
    json!({ "StartAt": "P", "States": { "P": { "Type": "Pass", "End": true } } }),
    json!({ "a": 1 }),
  )
  .await
  .unwrap();

  assert!(result.is_success());
  assert_eq!(result.output, json!({ "a": 1 }));
}

#[tokio::test]
async fn test_pass_result_and_paths() {
  let result = run(
    json!({
      "StartAt": "Inject",
      "States": {
        "Inject": {
          "Type": "Pass",
          "Result": { "x": 1 },
          "ResultPath": "$.injected",
          "Next": "Narrow"
        },
        "Narrow": { "Type": "Pass", "InputPath": "$.injected", "OutputPath": "$.x", "End": true }
      }
    }),
    json!({ "a": 1 }),
  )
  .await
  .unwrap();

  assert_eq!(result.output, json!(1));
}

#[tokio::test]
async fn test_minimal_succeed() {
  let result = run(
    json!({ "StartAt": "a1", "States": { "a1": { "Type": "Succeed" } } }),
    json!({}),
  )
  .await
  .unwrap();

  assert_eq!(result.status, ExecutionStatus::Succeeded);
  assert_eq!(result.output, json!({}));
}

#[tokio::test]
async fn test_choice_routes_and_falls_back() {
  let document = json!({
    "StartAt": "State1",
    "States": {
      "State1": {
        "Type": "Choice",
        "Choices": [
          { "Variable": "$.enabled", "BooleanEquals": true, "Next": "State2" },
          { "Variable": "$.count", "NumericGreaterThan": 10, "Next": "State3" }
        ],
        "Default": "State3"
      },
      "State2": { "Type": "Pass", "Result": "enabled", "End": true },
      "State3": { "Type": "Pass", "Result": "fallback", "End": true }
    }
  });

  let result = run(document.clone(), json!({ "enabled": true })).await.unwrap();
  assert_eq!(result.output, json!("enabled"));

  let result = run(document, json!({ "enabled": false, "count": 3 })).await.unwrap();
  assert_eq!(result.output, json!("fallback"));
}

#[tokio::test]
async fn test_choice_without_match_fails() {
  let err = run(
    json!({
      "StartAt": "Pick",
      "States": {
        "Pick": {
          "Type": "Choice",
          "Choices": [{ "Variable": "$.n", "NumericEquals": 1, "Next": "Done" }]
        },
        "Done": { "Type": "Succeed" }
      }
    }),
    json!({ "n": 2 }),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { state, error } => {
      assert_eq!(state, "Pick");
      assert_eq!(error.name, ErrorName::NoChoiceMatched);
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[tokio::test]
async fn test_fail_state_sets_status() {
  let result = run(
    json!({
      "StartAt": "Stop",
      "States": { "Stop": { "Type": "Fail", "Error": "Order.Invalid", "Cause": "missing sku" } }
    }),
    json!({}),
  )
  .await
  .unwrap();

  assert!(!result.is_success());
  assert_eq!(
    result.status,
    ExecutionStatus::Failed {
      error: Some("Order.Invalid".to_string()),
      cause: Some("missing sku".to_string()),
    }
  );
  assert_eq!(result.output, Value::Null);
}

#[tokio::test]
async fn test_parameters_read_context_and_intrinsics() {
  let result = run(
    json!({
      "StartAt": "Build",
      "States": {
        "Build": {
          "Type": "Pass",
          "Parameters": {
            "id.$": "$$.Execution.Id",
            "state.$": "$$.State.Name",
            "greeting.$": "States.Format('Hello, {}!', $.who)",
            "fixed": [1, 2]
          },
          "End": true
        }
      }
    }),
    json!({ "who": "World" }),
  )
  .await
  .unwrap();

  assert_eq!(result.output["id"], json!(result.execution_id));
  assert_eq!(result.output["state"], json!("Build"));
  assert_eq!(result.output["greeting"], json!("Hello, World!"));
  assert_eq!(result.output["fixed"], json!([1, 2]));
}

#[tokio::test]
async fn test_result_path_index_out_of_range() {
  let err = run(
    json!({
      "StartAt": "P",
      "States": {
        "P": { "Type": "Pass", "Result": 1, "ResultPath": "$.a[100000000000]", "End": true }
      }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { state, error } => {
      assert_eq!(state, "P");
      assert_eq!(error.name, ErrorName::ResultPathMatchFailure);
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[tokio::test]
async fn test_unknown_resource_type_is_task_failure() {
  let err = run(
    json!({
      "StartAt": "Call",
      "States": { "Call": { "Type": "Task", "Resource": "lambda:resize", "End": true } }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { state, error } => {
      assert_eq!(state, "Call");
      assert_eq!(error.name, ErrorName::TaskFailed);
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[tokio::test]
async fn test_task_result_selector_and_result_path() {
  let config = config_with("sleep", SleepTask::new());
  let result = run_with(
    config,
    json!({
      "StartAt": "Call",
      "States": {
        "Call": {
          "Type": "Task",
          "Resource": "sleep:fast",
          "Parameters": { "ms": 0, "value.$": "$.value" },
          "ResultSelector": { "echoed.$": "$.value" },
          "ResultPath": "$.result",
          "End": true
        }
      }
    }),
    json!({ "value": "v" }),
  )
  .await
  .unwrap();

  assert_eq!(result.output, json!({ "value": "v", "result": { "echoed": "v" } }));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_preserves_branch_order() {
  let config = config_with("sleep", SleepTask::new());
  let branch = |ms: u64| {
    json!({
      "StartAt": "Sleep",
      "States": {
        "Sleep": { "Type": "Task", "Resource": "sleep:branch", "Parameters": { "ms": ms }, "End": true }
      }
    })
  };

  let result = run_with(
    config,
    json!({
      "StartAt": "Fork",
      "States": {
        "Fork": { "Type": "Parallel", "Branches": [branch(30), branch(10), branch(20)], "End": true }
      }
    }),
    json!({}),
  )
  .await
  .unwrap();

  assert_eq!(result.output, json!([{ "ms": 30 }, { "ms": 10 }, { "ms": 20 }]));
}

#[tokio::test]
async fn test_parallel_branch_failure() {
  let err = run(
    json!({
      "StartAt": "Fork",
      "States": {
        "Fork": {
          "Type": "Parallel",
          "Branches": [
            { "StartAt": "Ok", "States": { "Ok": { "Type": "Pass", "End": true } } },
            { "StartAt": "Bad", "States": { "Bad": { "Type": "Fail", "Error": "Bad.Branch" } } }
          ],
          "End": true
        }
      }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { state, error } => {
      assert_eq!(state, "Fork");
      assert_eq!(error.name, ErrorName::BranchFailed);
      assert!(error.cause.contains("Bad.Branch"));
    }
    other => panic!("unexpected error: {:?}", other),
  }
}

#[tokio::test(start_paused = true)]
async fn test_parallel_failure_cancels_siblings() {
  let task = SleepTask::new();
  let running = task.running.clone();
  let config = config_with("sleep", task);
  let start = tokio::time::Instant::now();

  let err = run_with(
    config,
    json!({
      "StartAt": "Fork",
      "States": {
        "Fork": {
          "Type": "Parallel",
          "Branches": [
            {
              "StartAt": "Slow",
              "States": {
                "Slow": { "Type": "Task", "Resource": "sleep:slow", "Parameters": { "ms": 3600000 }, "End": true }
              }
            },
            { "StartAt": "Nap", "States": { "Nap": { "Type": "Wait", "Seconds": 3600, "End": true } } },
            {
              "StartAt": "Pause",
              "States": {
                "Pause": { "Type": "Wait", "Seconds": 1, "Next": "Bad" },
                "Bad": { "Type": "Fail", "Error": "Bad.Branch" }
              }
            }
          ],
          "End": true
        }
      }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { error, .. } => assert_eq!(error.name, ErrorName::BranchFailed),
    other => panic!("unexpected error: {:?}", other),
  }
  assert!(start.elapsed() < Duration::from_secs(60));
  assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_parallel_failure_can_be_caught() {
  let result = run(
    json!({
      "StartAt": "Fork",
      "States": {
        "Fork": {
          "Type": "Parallel",
          "Branches": [
            { "StartAt": "Bad", "States": { "Bad": { "Type": "Fail" } } }
          ],
          "Catch": [{ "ErrorEquals": ["States.BranchFailed"], "Next": "Recover" }],
          "End": true
        },
        "Recover": { "Type": "Pass", "OutputPath": "$.Error", "End": true }
      }
    }),
    json!({}),
  )
  .await
  .unwrap();

  assert_eq!(result.output, json!("States.BranchFailed"));
}

#[tokio::test(start_paused = true)]
async fn test_map_limits_concurrency() {
  let task = SleepTask::new();
  let peak = task.peak.clone();
  let config = config_with("sleep", task);

  let result = run_with(
    config,
    json!({
      "StartAt": "Each",
      "States": {
        "Each": {
          "Type": "Map",
          "ItemsPath": "$.items",
          "MaxConcurrency": 2,
          "Parameters": {
            "ms.$": "$$.Map.Item.Value",
            "index.$": "$$.Map.Item.Index"
          },
          "Iterator": {
            "StartAt": "Sleep",
            "States": { "Sleep": { "Type": "Task", "Resource": "sleep:item", "End": true } }
          },
          "End": true
        }
      }
    }),
    json!({ "items": [40, 10, 30, 20, 5] }),
  )
  .await
  .unwrap();

  assert_eq!(
    result.output,
    json!([
      { "ms": 40, "index": 0 },
      { "ms": 10, "index": 1 },
      { "ms": 30, "index": 2 },
      { "ms": 20, "index": 3 },
      { "ms": 5, "index": 4 }
    ])
  );
  assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_map_failure_cancels_siblings() {
  let task = SleepTask::new();
  let running = task.running.clone();
  let config = config_with("sleep", task);
  let start = tokio::time::Instant::now();

  let err = run_with(
    config,
    json!({
      "StartAt": "Each",
      "States": {
        "Each": {
          "Type": "Map",
          "ItemsPath": "$.items",
          "Iterator": {
            "StartAt": "Check",
            "States": {
              "Check": {
                "Type": "Choice",
                "Choices": [{ "Variable": "$", "IsNumeric": true, "Next": "Sleep" }],
                "Default": "Bad"
              },
              "Sleep": {
                "Type": "Task",
                "Resource": "sleep:item",
                "Parameters": { "ms.$": "$" },
                "End": true
              },
              "Bad": { "Type": "Fail", "Error": "Bad.Item" }
            }
          },
          "End": true
        }
      }
    }),
    json!({ "items": [3600000, 3600000, "boom"] }),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { state, error } => {
      assert_eq!(state, "Each");
      assert_eq!(error.name, ErrorName::BranchFailed);
      assert!(error.cause.contains("Bad.Item"));
    }
    other => panic!("unexpected error: {:?}", other),
  }
  assert!(start.elapsed() < Duration::from_secs(60));
  assert_eq!(running.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_map_items_must_be_array() {
  let err = run(
    json!({
      "StartAt": "Each",
      "States": {
        "Each": {
          "Type": "Map",
          "ItemsPath": "$.items",
          "Iterator": { "StartAt": "P", "States": { "P": { "Type": "Pass", "End": true } } },
          "End": true
        }
      }
    }),
    json!({ "items": "not a list" }),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { error, .. } => assert_eq!(error.name, ErrorName::Runtime),
    other => panic!("unexpected error: {:?}", other),
  }
}

#[tokio::test(start_paused = true)]
async fn test_retry_until_success() {
  let calls = Arc::new(AtomicU32::new(0));
  let config = config_with(
    "flaky",
    FlakyTask {
      calls: calls.clone(),
      failures: 2,
      error: "Service.Unavailable",
    },
  );
  let (tx, mut rx) = mpsc::unbounded_channel();
  let runtime = Runtime::with_notifier(config, ChannelNotifier::new(tx));

  let result = runtime
    .execute(
      workflow(json!({
        "StartAt": "Call",
        "States": {
          "Call": {
            "Type": "Task",
            "Resource": "flaky:service",
            "Retry": [{ "ErrorEquals": ["Service.Unavailable"], "IntervalSeconds": 1, "MaxAttempts": 3 }],
            "End": true
          }
        }
      })),
      json!({ "n": 1 }),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(result.output, json!({ "calls": 3, "input": { "n": 1 } }));
  assert_eq!(calls.load(Ordering::SeqCst), 3);

  let mut delays = Vec::new();
  while let Ok(event) = rx.try_recv() {
    if let ExecutionEvent::StateRetried { delay_ms, .. } = event {
      delays.push(delay_ms);
    }
  }
  assert_eq!(delays, vec![1000, 2000]);
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhausted_then_caught() {
  let calls = Arc::new(AtomicU32::new(0));
  let config = config_with(
    "flaky",
    FlakyTask {
      calls: calls.clone(),
      failures: u32::MAX,
      error: "Service.Unavailable",
    },
  );

  let result = run_with(
    config,
    json!({
      "StartAt": "Call",
      "States": {
        "Call": {
          "Type": "Task",
          "Resource": "flaky:service",
          "Retry": [{ "ErrorEquals": ["States.ALL"], "MaxAttempts": 2 }],
          "Catch": [{ "ErrorEquals": ["States.ALL"], "ResultPath": "$.error", "Next": "Recover" }],
          "End": true
        },
        "Recover": { "Type": "Pass", "End": true }
      }
    }),
    json!({ "order": 7 }),
  )
  .await
  .unwrap();

  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(
    result.output,
    json!({ "order": 7, "error": { "Error": "Service.Unavailable", "Cause": "call 3" } })
  );
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff_overflow_waits_until_timeout() {
  let calls = Arc::new(AtomicU32::new(0));
  let config = config_with(
    "flaky",
    FlakyTask {
      calls: calls.clone(),
      failures: 10,
      error: "Service.Down",
    },
  );

  let err = run_with(
    config,
    json!({
      "StartAt": "Call",
      "TimeoutSeconds": 5,
      "States": {
        "Call": {
          "Type": "Task",
          "Resource": "flaky:service",
          "Retry": [{ "ErrorEquals": ["Service.Down"], "MaxAttempts": 3, "BackoffRate": 1e300 }],
          "End": true
        }
      }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  assert!(matches!(err, ExecutionError::TimedOut { seconds: 5 }));
  assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_states_all_retrier_skips_data_errors() {
  let err = run(
    json!({
      "StartAt": "Build",
      "States": {
        "Build": {
          "Type": "Task",
          "Resource": "script:/bin/true",
          "Parameters": { "x.$": "$.missing" },
          "Retry": [{ "ErrorEquals": ["States.ALL"] }],
          "End": true
        }
      }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  match err {
    ExecutionError::StateFailed { error, .. } => assert_eq!(error.name, ErrorName::ParameterPathFailure),
    other => panic!("unexpected error: {:?}", other),
  }
}

#[tokio::test(start_paused = true)]
async fn test_task_timeout_is_catchable() {
  let config = config_with("sleep", SleepTask::new());
  let result = run_with(
    config,
    json!({
      "StartAt": "Slow",
      "States": {
        "Slow": {
          "Type": "Task",
          "Resource": "sleep:slow",
          "Parameters": { "ms": 5000 },
          "TimeoutSeconds": 1,
          "Catch": [{ "ErrorEquals": ["States.Timeout"], "Next": "Late" }],
          "End": true
        },
        "Late": { "Type": "Pass", "OutputPath": "$.Error", "End": true }
      }
    }),
    json!({}),
  )
  .await
  .unwrap();

  assert_eq!(result.output, json!("States.Timeout"));
}

#[tokio::test(start_paused = true)]
async fn test_workflow_timeout() {
  let err = run(
    json!({
      "StartAt": "Nap",
      "TimeoutSeconds": 1,
      "States": { "Nap": { "Type": "Wait", "Seconds": 60, "End": true } }
    }),
    json!({}),
  )
  .await
  .unwrap_err();

  assert!(matches!(err, ExecutionError::TimedOut { seconds: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_wait_seconds_path() {
  let start = tokio::time::Instant::now();
  let result = run(
    json!({
      "StartAt": "Nap",
      "States": { "Nap": { "Type": "Wait", "SecondsPath": "$.delay", "End": true } }
    }),
    json!({ "delay": 5 }),
  )
  .await
  .unwrap();

  assert_eq!(result.output, json!({ "delay": 5 }));
  assert!(start.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_cancellation() {
  let cancel = CancellationToken::new();
  let runtime = Runtime::new(RuntimeConfig::default());
  let handle = {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      runtime
        .execute(
          workflow(json!({
            "StartAt": "Nap",
            "States": { "Nap": { "Type": "Wait", "Seconds": 3600, "End": true } }
          })),
          json!({}),
          cancel,
        )
        .await
    })
  };

  tokio::time::sleep(Duration::from_millis(20)).await;
  cancel.cancel();

  let err = handle.await.unwrap().unwrap_err();
  assert!(matches!(err, ExecutionError::Cancelled));
}

#[tokio::test]
async fn test_events_follow_execution() {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let runtime = Runtime::with_notifier(RuntimeConfig::default(), ChannelNotifier::new(tx));

  runtime
    .execute(
      workflow(json!({
        "StartAt": "One",
        "States": {
          "One": { "Type": "Pass", "Next": "Two" },
          "Two": { "Type": "Succeed" }
        }
      })),
      json!({ "k": "v" }),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  let mut kinds = Vec::new();
  while let Ok(event) = rx.try_recv() {
    kinds.push(match event {
      ExecutionEvent::ExecutionStarted { .. } => "started".to_string(),
      ExecutionEvent::StateEntered { state, .. } => format!("enter {}", state),
      ExecutionEvent::StateExited { state, .. } => format!("exit {}", state),
      ExecutionEvent::ExecutionSucceeded { .. } => "succeeded".to_string(),
      other => panic!("unexpected event: {:?}", other),
    });
  }

  assert_eq!(
    kinds,
    vec!["started", "enter One", "exit One", "enter Two", "exit Two", "succeeded"]
  );
}

#[cfg(unix)]
#[tokio::test]
async fn test_script_task_end_to_end() {
  let result = run(
    json!({
      "StartAt": "Greet",
      "States": {
        "Greet": {
          "Type": "Task",
          "Resource": "script:/bin/sh",
          "Parameters": {
            "args.$": "States.Array('-c', 'echo WAYPOINT_OUT_greeting=hello-$WAYPOINT_IN_2', $.name)"
          },
          "ResultPath": "$.script",
          "End": true
        }
      }
    }),
    json!({ "name": "ada" }),
  )
  .await
  .unwrap();

  assert_eq!(
    result.output,
    json!({ "name": "ada", "script": { "greeting": "hello-ada" } })
  );
}
