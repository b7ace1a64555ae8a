//! The context object.
//!
//! Execution metadata (execution id, current state, map item) lives in a
//! document separate from the data flowing between states. Paths prefixed
//! with `$$` read from it. Writes never mutate a context in place: they
//! return a new one, so snapshots handed to parallel branches stay stable.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::PathError;
use crate::path::Path;

/// Execution metadata reachable through `$$` paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextObject {
  value: Arc<Value>,
}

impl ContextObject {
  /// An empty context.
  pub fn new() -> Self {
    Self::from_value(Value::Object(Map::new()))
  }

  pub fn from_value(value: Value) -> Self {
    Self {
      value: Arc::new(value),
    }
  }

  /// The whole context document.
  pub fn value(&self) -> &Value {
    &self.value
  }

  /// Reads the first node selected by `path`.
  pub fn get(&self, path: &Path) -> Option<Value> {
    path.get(&self.value).into_iter().next().cloned()
  }

  /// Returns a copy of this context with `value` written at `path`.
  pub fn set(&self, path: &Path, value: Value) -> Result<Self, PathError> {
    let mut next = (*self.value).clone();
    path.expr().set(&mut next, value)?;
    Ok(Self::from_value(next))
  }

  /// Like [`ContextObject::set`], parsing `path` first.
  pub fn with(&self, path: &str, value: Value) -> Result<Self, PathError> {
    self.set(&Path::parse(path)?, value)
  }
}

impl Default for ContextObject {
  fn default() -> Self {
    Self::new()
  }
}
