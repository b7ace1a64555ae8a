//! Path error types.

/// Errors produced while parsing or applying paths.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PathError {
  /// The path text is not a valid JSONPath expression.
  #[error("invalid path '{path}' at offset {offset}: {message}")]
  Parse {
    path: String,
    offset: usize,
    message: String,
  },

  /// The path uses an operator that reference paths do not allow.
  #[error("'{path}' is not a reference path: {operator} is not allowed")]
  NotReferencePath {
    path: String,
    operator: &'static str,
  },

  /// A read expected exactly one matching node.
  #[error("invalid length of path result: '{path}' matched {count} values")]
  InvalidLength { path: String, count: usize },

  /// A write could not be applied to the document.
  #[error("cannot write to '{path}': {message}")]
  Write { path: String, message: String },
}
