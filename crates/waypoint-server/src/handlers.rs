use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use waypoint_engine::ExecutionStatus;

use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /executions`. `input` is JSON text; empty means `{}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartExecutionRequest {
  #[serde(rename = "workflowName")]
  pub workflow_name: String,
  #[serde(default)]
  pub input: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartExecutionResponse {
  /// The final output as JSON text.
  pub output: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListWorkflowsResponse {
  pub workflows: Vec<String>,
}

pub async fn start_execution(
  State(state): State<AppState>,
  Json(request): Json<StartExecutionRequest>,
) -> Result<Json<StartExecutionResponse>, ApiError> {
  let input: Value = if request.input.trim().is_empty() {
    Value::Object(Default::default())
  } else {
    serde_json::from_str(&request.input).map_err(|e| ApiError::InvalidInput {
      message: e.to_string(),
    })?
  };

  let record = state.store.load_workflow(&request.workflow_name).await?;
  info!(workflow = %request.workflow_name, "starting execution");

  let result = state
    .runtime
    .execute(record.workflow, input, state.shutdown.child_token())
    .await
    .map_err(|e| ApiError::ExecutionFailed { message: e.to_string() })?;

  match result.status {
    ExecutionStatus::Succeeded => Ok(Json(StartExecutionResponse {
      output: result.output.to_string(),
    })),
    ExecutionStatus::Failed { error, cause } => Err(ApiError::ExecutionFailed {
      message: format!(
        "{}: {}",
        error.as_deref().unwrap_or("Fail"),
        cause.as_deref().unwrap_or_default()
      ),
    }),
  }
}

pub async fn list_workflows(State(state): State<AppState>) -> Result<Json<ListWorkflowsResponse>, ApiError> {
  let workflows = state.store.list_workflows().await?;
  Ok(Json(ListWorkflowsResponse { workflows }))
}
