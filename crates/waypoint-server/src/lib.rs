//! Waypoint Server
//!
//! Starts executions of registered workflows over HTTP:
//!
//! - `POST /executions` with `{"workflowName": "...", "input": "<json>"}`
//!   returns `{"output": "<json>"}`
//! - `GET /workflows` lists registered workflow names

mod error;
mod handlers;
mod state;

pub use error::ApiError;
pub use handlers::{ListWorkflowsResponse, StartExecutionRequest, StartExecutionResponse};
pub use state::AppState;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the router.
pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/executions", post(handlers::start_execution))
    .route("/workflows", get(handlers::list_workflows))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Serve until `state.shutdown` is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
  let shutdown = state.shutdown.clone();
  if let Ok(addr) = listener.local_addr() {
    info!(addr = %addr, "server listening");
  }
  axum::serve(listener, router(state))
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}
