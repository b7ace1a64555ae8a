use std::sync::Arc;
use std::time::Duration;

use waypoint_intrinsic::IntrinsicRegistry;
use waypoint_task::TaskRegistry;

/// Configuration for the runtime.
///
/// Built once at startup. The registries are read-only from then on and
/// shared by every execution.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Executors for Task states, keyed by resource type.
  pub tasks: Arc<TaskRegistry>,
  /// Functions available to payload templates.
  pub intrinsics: Arc<IntrinsicRegistry>,
  /// Upper bound for every execution, on top of the workflow's own
  /// `TimeoutSeconds`.
  pub timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      tasks: Arc::new(TaskRegistry::with_builtins()),
      intrinsics: Arc::new(IntrinsicRegistry::with_builtins()),
      timeout: None,
    }
  }
}
