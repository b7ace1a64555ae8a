//! Resource type to executor table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::error::TaskError;
use crate::executor::TaskExecutor;
use crate::script::{SCRIPT_RESOURCE_TYPE, ScriptTask};

/// Executors keyed by resource type.
///
/// Built at startup and then shared read-only, usually behind an `Arc`.
#[derive(Clone, Default)]
pub struct TaskRegistry {
  executors: HashMap<String, Arc<dyn TaskExecutor>>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with the `script` executor.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry.register(SCRIPT_RESOURCE_TYPE, ScriptTask::new());
    registry
  }

  pub fn register(&mut self, resource_type: impl Into<String>, executor: impl TaskExecutor + 'static) {
    self.executors.insert(resource_type.into(), Arc::new(executor));
  }

  pub fn get(&self, resource_type: &str) -> Option<Arc<dyn TaskExecutor>> {
    self.executors.get(resource_type).cloned()
  }

  pub fn resource_types(&self) -> Vec<&str> {
    let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
    types.sort_unstable();
    types
  }

  /// Dispatch to the executor registered for `resource_type`.
  #[instrument(name = "task_execute", skip(self, input, cancel))]
  pub async fn execute(
    &self,
    resource_type: &str,
    path: &str,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<Value, TaskError> {
    let executor = self
      .get(resource_type)
      .ok_or_else(|| TaskError::UnknownResourceType {
        resource_type: resource_type.to_string(),
      })?;

    info!(input = %input, "task started");
    let result = executor.execute(cancel, path, input).await;
    match &result {
      Ok(output) => info!(output = %output, "task completed"),
      Err(e) => error!(error = %e, "task failed"),
    }
    result
  }
}

impl fmt::Debug for TaskRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskRegistry")
      .field("resource_types", &self.resource_types())
      .finish()
  }
}
