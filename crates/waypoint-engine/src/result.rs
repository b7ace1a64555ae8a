//! Execution result types.

use serde::{Deserialize, Serialize};

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionStatus {
  /// A Succeed state or an `End` transition was reached.
  Succeeded,
  /// A Fail state was reached.
  Failed {
    error: Option<String>,
    cause: Option<String>,
  },
}

/// Result of a complete workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
  /// Unique execution ID.
  pub execution_id: String,
  pub status: ExecutionStatus,
  /// Final output. `null` when a Fail state ended the run.
  pub output: serde_json::Value,
}

impl ExecutionResult {
  pub fn is_success(&self) -> bool {
    self.status == ExecutionStatus::Succeeded
  }
}
