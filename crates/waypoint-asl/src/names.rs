//! Run-time error names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Matcher that selects every error name.
pub const STATES_ALL: &str = "States.ALL";

/// The name carried by a run-time error.
///
/// Built-in names are prefixed with `States.`. Anything else (a name
/// reported by a task or declared on a Fail state) is kept as
/// [`ErrorName::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorName {
  Timeout,
  HeartbeatTimeout,
  TaskFailed,
  Permissions,
  ResultPathMatchFailure,
  ParameterPathFailure,
  BranchFailed,
  NoChoiceMatched,
  IntrinsicFailure,
  Runtime,
  Custom(String),
}

impl ErrorName {
  pub fn as_str(&self) -> &str {
    match self {
      ErrorName::Timeout => "States.Timeout",
      ErrorName::HeartbeatTimeout => "States.HeartbeatTimeout",
      ErrorName::TaskFailed => "States.TaskFailed",
      ErrorName::Permissions => "States.Permissions",
      ErrorName::ResultPathMatchFailure => "States.ResultPathMatchFailure",
      ErrorName::ParameterPathFailure => "States.ParameterPathFailure",
      ErrorName::BranchFailed => "States.BranchFailed",
      ErrorName::NoChoiceMatched => "States.NoChoiceMatched",
      ErrorName::IntrinsicFailure => "States.IntrinsicFailure",
      ErrorName::Runtime => "States.Runtime",
      ErrorName::Custom(name) => name,
    }
  }

  pub fn from_name(name: &str) -> Self {
    match name {
      "States.Timeout" => ErrorName::Timeout,
      "States.HeartbeatTimeout" => ErrorName::HeartbeatTimeout,
      "States.TaskFailed" => ErrorName::TaskFailed,
      "States.Permissions" => ErrorName::Permissions,
      "States.ResultPathMatchFailure" => ErrorName::ResultPathMatchFailure,
      "States.ParameterPathFailure" => ErrorName::ParameterPathFailure,
      "States.BranchFailed" => ErrorName::BranchFailed,
      "States.NoChoiceMatched" => ErrorName::NoChoiceMatched,
      "States.IntrinsicFailure" => ErrorName::IntrinsicFailure,
      "States.Runtime" => ErrorName::Runtime,
      other => ErrorName::Custom(other.to_string()),
    }
  }

  /// Whether a `States.ALL` retrier applies to this error.
  ///
  /// Data-flow, choice and evaluation failures are only retried when a
  /// retrier names them explicitly.
  pub fn is_retried_by_default(&self) -> bool {
    !matches!(
      self,
      ErrorName::ResultPathMatchFailure
        | ErrorName::ParameterPathFailure
        | ErrorName::NoChoiceMatched
        | ErrorName::IntrinsicFailure
        | ErrorName::Runtime
    )
  }
}

impl fmt::Display for ErrorName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<String> for ErrorName {
  fn from(name: String) -> Self {
    ErrorName::from_name(&name)
  }
}

impl From<ErrorName> for String {
  fn from(name: ErrorName) -> Self {
    name.as_str().to_string()
  }
}
