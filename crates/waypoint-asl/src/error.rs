use thiserror::Error;
use waypoint_path::PathError;

/// Errors raised while compiling a workflow document.
///
/// Every variant is a validation failure: the document is rejected as a
/// whole and nothing is retried.
#[derive(Debug, Error)]
pub enum CompileError {
  #[error("invalid document: {message}")]
  InvalidDocument { message: String },

  #[error("document has no StartAt")]
  MissingStartAt,

  #[error("document has no States")]
  MissingStates,

  #[error("StartAt '{name}' is not a declared state")]
  StartAtNotFound { name: String },

  #[error("state '{state}' has no Type")]
  MissingType { state: String },

  #[error("state '{state}' has unknown Type '{type_name}'")]
  UnknownStateType { state: String, type_name: String },

  #[error("state '{state}' is invalid: {message}")]
  InvalidState { state: String, message: String },

  #[error("state '{state}' has invalid task resource '{resource}'")]
  InvalidTaskResource { state: String, resource: String },

  #[error("state '{state}' has malformed choice rule {index}: {message}")]
  InvalidChoiceRule {
    state: String,
    index: usize,
    message: String,
  },

  #[error("state '{state}' has invalid {field}: {source}")]
  InvalidPath {
    state: String,
    field: &'static str,
    #[source]
    source: PathError,
  },

  #[error("state '{state}' transitions to unknown state '{target}'")]
  UnknownTransition { state: String, target: String },

  #[error("state '{state}' declares both Next and End")]
  AmbiguousTransition { state: String },

  #[error("state '{state}' declares neither Next nor End")]
  MissingTransition { state: String },

  #[error("state '{state}' has invalid retrier: {message}")]
  InvalidRetrier { state: String, message: String },

  #[error("state '{state}' has invalid catcher: {message}")]
  InvalidCatcher { state: String, message: String },

  #[error("state '{state}' has invalid sub-workflow: {source}")]
  InvalidBranch {
    state: String,
    #[source]
    source: Box<CompileError>,
  },
}

impl CompileError {
  /// Compile errors are always validation errors.
  pub fn is_validation(&self) -> bool {
    true
  }
}

impl From<serde_json::Error> for CompileError {
  fn from(err: serde_json::Error) -> Self {
    CompileError::InvalidDocument {
      message: err.to_string(),
    }
  }
}
