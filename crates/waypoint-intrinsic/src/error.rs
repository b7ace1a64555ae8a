//! Intrinsic function error types.

use waypoint_path::PathError;

/// Errors raised while parsing or evaluating an intrinsic function call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntrinsicError {
  /// The expression is not a well-formed call.
  #[error("invalid intrinsic expression '{expr}': {message}")]
  Parse { expr: String, message: String },

  /// No function is registered under this name.
  #[error("unknown intrinsic function '{name}'")]
  UnknownFunction { name: String },

  /// The function rejected its arguments.
  #[error("{function}: {message}")]
  InvalidArguments { function: String, message: String },

  /// A path argument could not be resolved.
  #[error("failed to resolve argument: {0}")]
  Path(#[from] PathError),
}
