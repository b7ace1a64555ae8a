use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use waypoint_engine::Runtime;
use waypoint_store::WorkflowStore;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn WorkflowStore>,
  pub runtime: Runtime,
  /// Cancelled when the server shuts down; running executions are
  /// cancelled with it.
  pub shutdown: CancellationToken,
}

impl AppState {
  pub fn new(store: Arc<dyn WorkflowStore>, runtime: Runtime) -> Self {
    Self {
      store,
      runtime,
      shutdown: CancellationToken::new(),
    }
  }
}
