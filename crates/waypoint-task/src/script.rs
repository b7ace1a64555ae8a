//! The `script` executor.
//!
//! Runs a local program. The task input must be an object with `args`:
//!
//! - `args` becomes the argument list (array elements one each, a scalar
//!   as a single argument, an object as none)
//! - `args` is also flattened into `WAYPOINT_IN...` environment variables,
//!   e.g. `{"args": {"size": [1, 2]}}` sets `WAYPOINT_IN_size_0=1` and
//!   `WAYPOINT_IN_size_1=2`
//!
//! Stdout lines `WAYPOINT_OUT_<key>=<value>` become the output object. A
//! `WAYPOINT_ERR=<name>` line fails the task with that error name.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::executor::TaskExecutor;

pub const SCRIPT_RESOURCE_TYPE: &str = "script";

const INPUT_PREFIX: &str = "WAYPOINT_IN";
const OUTPUT_PREFIX: &str = "WAYPOINT_OUT";
const ERROR_PREFIX: &str = "WAYPOINT_ERR=";

#[derive(Debug, Clone, Default)]
pub struct ScriptTask;

impl ScriptTask {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl TaskExecutor for ScriptTask {
  async fn execute(
    &self,
    cancel: CancellationToken,
    path: &str,
    input: Value,
  ) -> Result<Value, TaskError> {
    let args = input.get("args").ok_or_else(|| TaskError::InvalidInput {
      message: "'args' not found".to_string(),
    })?;

    let mut env = Vec::new();
    flatten_env(INPUT_PREFIX.to_string(), args, &mut env);

    let mut command = Command::new(path);
    command
      .args(argv(args))
      .envs(env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let child = command.spawn().map_err(|source| TaskError::Spawn {
      program: path.to_string(),
      source,
    })?;
    debug!(program = %path, pid = ?child.id(), "script started");

    // dropping the wait future on cancel kills the child
    let output = tokio::select! {
      output = child.wait_with_output() => output.map_err(|source| TaskError::Spawn {
        program: path.to_string(),
        source,
      })?,
      _ = cancel.cancelled() => {
        warn!(program = %path, "script cancelled");
        return Err(TaskError::Cancelled);
      }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let (result, reported) = parse_output(&stdout);

    if let Some(name) = reported {
      return Err(TaskError::Failed {
        error: Some(name),
        cause: stderr,
      });
    }
    if !output.status.success() {
      let cause = if stderr.is_empty() {
        format!("'{}' exited with {}", path, output.status)
      } else {
        stderr
      };
      return Err(TaskError::Failed { error: None, cause });
    }

    Ok(Value::Object(result))
  }
}

fn scalar(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn argv(args: &Value) -> Vec<String> {
  match args {
    Value::Array(items) => items.iter().map(scalar).collect(),
    Value::Object(_) => Vec::new(),
    other => vec![scalar(other)],
  }
}

fn flatten_env(key: String, value: &Value, out: &mut Vec<(String, String)>) {
  match value {
    Value::Object(map) => {
      for (k, v) in map {
        flatten_env(format!("{}_{}", key, k), v, out);
      }
    }
    Value::Array(items) => {
      for (i, v) in items.iter().enumerate() {
        flatten_env(format!("{}_{}", key, i), v, out);
      }
    }
    other => out.push((key, scalar(other))),
  }
}

/// Output fields, plus the reported error name if there was one.
fn parse_output(stdout: &str) -> (Map<String, Value>, Option<String>) {
  let mut fields = Map::new();
  let mut reported = None;

  for line in stdout.lines() {
    if let Some(name) = line.strip_prefix(ERROR_PREFIX) {
      reported = Some(name.to_string());
      continue;
    }
    let Some(rest) = line.strip_prefix(OUTPUT_PREFIX) else {
      continue;
    };
    let Some((key, value)) = rest.split_once('=') else {
      continue;
    };
    let key = key.strip_prefix('_').unwrap_or(key);
    fields.insert(key.to_string(), Value::String(value.to_string()));
  }

  (fields, reported)
}
