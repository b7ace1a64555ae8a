//! Data-flow filters applied around every state.
//!
//! ```text
//!   raw input ─InputPath─> effective input ─Parameters─> task input
//!                                                           │ state logic
//!   output <─OutputPath─ joined <─ResultPath─ result <─ResultSelector─┘
//! ```
//!
//! `ResultPath` writes into the raw input, not the effective input.

use serde_json::{Map, Value};
use waypoint_asl::{ErrorName, PathSpec};
use waypoint_path::{ContextObject, Path, ReferencePath, join, unjoin};

use crate::error::StatesError;

fn empty_object() -> Value {
  Value::Object(Map::new())
}

/// `InputPath` and `OutputPath`. Absent keeps the value, `null` yields
/// `{}`.
pub(crate) fn select(
  field: &str,
  spec: Option<&PathSpec<Path>>,
  context: &ContextObject,
  value: Value,
) -> Result<Value, StatesError> {
  match spec {
    None => Ok(value),
    Some(PathSpec::Discard) => Ok(empty_object()),
    Some(PathSpec::Path(path)) => unjoin(context, &value, path)
      .map_err(|e| StatesError::new(ErrorName::Runtime, format!("{}: {}", field, e))),
  }
}

/// `ResultPath`. Absent replaces the raw input with the result, `null`
/// keeps the raw input and drops the result.
pub(crate) fn merge(
  spec: Option<&PathSpec<ReferencePath>>,
  context: &ContextObject,
  raw_input: Value,
  result: Value,
) -> Result<Value, StatesError> {
  match spec {
    None => Ok(result),
    Some(PathSpec::Discard) => Ok(raw_input),
    Some(PathSpec::Path(path)) => join(context, raw_input, result, path.as_path())
      .map_err(|e| StatesError::new(ErrorName::ResultPathMatchFailure, e)),
  }
}
