//! API error type mapping to HTTP status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;
use waypoint_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
  /// No workflow is registered under the requested name.
  #[error("workflow not found: {name}")]
  WorkflowNotFound { name: String },

  /// The request input is not valid JSON.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },

  /// The execution ended without succeeding.
  #[error("execution failed: {message}")]
  ExecutionFailed { message: String },

  #[error(transparent)]
  Store(StoreError),
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::NotFound { name } => ApiError::WorkflowNotFound { name },
      other => ApiError::Store(other),
    }
  }
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::WorkflowNotFound { .. } => StatusCode::NOT_FOUND,
      ApiError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
      ApiError::ExecutionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
