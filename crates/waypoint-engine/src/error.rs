//! Run-time error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use waypoint_asl::ErrorName;

/// A named run-time error, as seen by Retry and Catch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {cause}")]
pub struct StatesError {
  pub name: ErrorName,
  pub cause: String,
}

impl StatesError {
  pub fn new(name: ErrorName, cause: impl fmt::Display) -> Self {
    Self {
      name,
      cause: cause.to_string(),
    }
  }

  /// The object handed to a catcher's target: `{"Error": .., "Cause": ..}`.
  pub fn to_output(&self) -> serde_json::Value {
    serde_json::json!({
      "Error": self.name.as_str(),
      "Cause": self.cause,
    })
  }
}

/// Errors that end an execution without reaching a Succeed, Fail or End
/// state.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,

  /// The overall timeout elapsed.
  #[error("execution timed out after {seconds}s")]
  TimedOut { seconds: u64 },

  /// A transition named a state the workflow doesn't hold.
  #[error("state '{state}' not found")]
  StateNotFound { state: String },

  /// A state raised an error that no catcher handled.
  #[error("state '{state}' failed: {error}")]
  StateFailed {
    state: String,
    #[source]
    error: StatesError,
  },
}

/// Why a run stopped early.
#[derive(Debug)]
pub(crate) enum Halt {
  /// A run-time error not yet attributed to a state. Retry and Catch see
  /// these.
  Error(StatesError),
  /// An error that escaped every retrier and catcher of `state`.
  Unhandled { state: String, error: StatesError },
  /// A Fail state was reached.
  FailState {
    error: Option<String>,
    cause: Option<String>,
  },
  StateNotFound(String),
  Cancelled,
}

impl From<StatesError> for Halt {
  fn from(error: StatesError) -> Self {
    Halt::Error(error)
  }
}

impl Halt {
  /// Collapse a sub-workflow's halt into the error its Parallel or Map
  /// state raises.
  pub(crate) fn into_branch_failure(self, branch: usize) -> Halt {
    let cause = match self {
      Halt::Cancelled => return Halt::Cancelled,
      Halt::Error(error) => format!("branch {} failed: {}", branch, error),
      Halt::Unhandled { state, error } => {
        format!("branch {} failed at state '{}': {}", branch, state, error)
      }
      Halt::FailState { error, cause } => format!(
        "branch {} reached a Fail state: {}: {}",
        branch,
        error.as_deref().unwrap_or_default(),
        cause.as_deref().unwrap_or_default()
      ),
      Halt::StateNotFound(state) => format!("branch {} has no state '{}'", branch, state),
    };
    Halt::Error(StatesError::new(ErrorName::BranchFailed, cause))
  }
}
