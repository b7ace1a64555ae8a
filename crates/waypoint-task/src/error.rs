//! Task dispatch errors.

/// Errors returned by task executors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
  /// The execution was cancelled while the task ran.
  #[error("task cancelled")]
  Cancelled,

  /// No executor is registered for the resource type.
  #[error("unknown resource type '{resource_type}'")]
  UnknownResourceType { resource_type: String },

  /// The task input doesn't have the shape the executor needs.
  #[error("invalid task input: {message}")]
  InvalidInput { message: String },

  /// The program could not be started.
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  /// The task ran and reported failure.
  ///
  /// `error` is the error name the task reported, if any.
  #[error("task failed: {cause}")]
  Failed { error: Option<String>, cause: String },
}
