//! Payload templates (`Parameters`, `ResultSelector`).
//!
//! A key ending in `.$` is dynamic. Its value must be a string and is
//! resolved against the input:
//!
//! ```text
//!   "name.$": "$.user.name"             -> path, read from the input
//!   "run.$":  "$$.Execution.Id"         -> path, read from the context object
//!   "msg.$":  "States.Format('{}', $.n)" -> intrinsic call
//!   "raw.$":  "plain"                   -> kept as written
//! ```
//!
//! The suffix is stripped from the key in every case. Other values are
//! copied, with nested objects and arrays resolved recursively.

use serde_json::{Map, Value};
use waypoint_asl::ErrorName;
use waypoint_intrinsic::{IntrinsicRegistry, is_call};
use waypoint_path::{ContextObject, Path, unjoin};

use crate::error::StatesError;

const DYNAMIC_SUFFIX: &str = ".$";

/// Resolves a template. Path failures raise `failure`, which is
/// `States.ParameterPathFailure` for Parameters and ResultSelector.
pub(crate) fn resolve(
  template: &Value,
  context: &ContextObject,
  input: &Value,
  intrinsics: &IntrinsicRegistry,
  failure: &ErrorName,
) -> Result<Value, StatesError> {
  match template {
    Value::Object(fields) => {
      let mut out = Map::with_capacity(fields.len());
      for (key, value) in fields {
        match key.strip_suffix(DYNAMIC_SUFFIX) {
          Some(name) => {
            let resolved = resolve_dynamic(key, value, context, input, intrinsics, failure)?;
            out.insert(name.to_string(), resolved);
          }
          None => {
            out.insert(key.clone(), resolve(value, context, input, intrinsics, failure)?);
          }
        }
      }
      Ok(Value::Object(out))
    }
    Value::Array(items) => items
      .iter()
      .map(|item| resolve(item, context, input, intrinsics, failure))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    other => Ok(other.clone()),
  }
}

fn resolve_dynamic(
  key: &str,
  value: &Value,
  context: &ContextObject,
  input: &Value,
  intrinsics: &IntrinsicRegistry,
  failure: &ErrorName,
) -> Result<Value, StatesError> {
  let Value::String(text) = value else {
    return Err(StatesError::new(
      failure.clone(),
      format!("value of '{}' must be a string", key),
    ));
  };

  if text.starts_with('$') {
    let path = Path::parse(text).map_err(|e| StatesError::new(failure.clone(), e))?;
    return unjoin(context, input, &path)
      .map_err(|e| StatesError::new(failure.clone(), format!("'{}': {}", key, e)));
  }

  if is_call(text) {
    return intrinsics
      .evaluate_str(text, context, input)
      .map_err(|e| StatesError::new(ErrorName::IntrinsicFailure, e));
  }

  Ok(Value::String(text.clone()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn run(template: Value, input: Value) -> Result<Value, StatesError> {
    let ctx = ContextObject::from_value(json!({ "Execution": { "Id": "exec-1" } }));
    resolve(
      &template,
      &ctx,
      &input,
      &IntrinsicRegistry::with_builtins(),
      &ErrorName::ParameterPathFailure,
    )
  }

  #[test]
  fn test_resolve_paths_and_literals() {
    let out = run(
      json!({
        "flagged": true,
        "user.$": "$.user.name",
        "run.$": "$$.Execution.Id",
        "raw.$": "plain",
        "nested": { "first.$": "$.items[0]", "list": [{ "n.$": "$.n" }, 3] }
      }),
      json!({ "user": { "name": "ada" }, "items": ["a", "b"], "n": 7 }),
    )
    .unwrap();

    assert_eq!(
      out,
      json!({
        "flagged": true,
        "user": "ada",
        "run": "exec-1",
        "raw": "plain",
        "nested": { "first": "a", "list": [{ "n": 7 }, 3] }
      })
    );
  }

  #[test]
  fn test_resolve_intrinsic() {
    let out = run(
      json!({ "greeting.$": "States.Format('Hello, {}!', $.who)" }),
      json!({ "who": "World" }),
    )
    .unwrap();
    assert_eq!(out, json!({ "greeting": "Hello, World!" }));
  }

  #[test]
  fn test_resolve_failures() {
    let err = run(json!({ "x.$": "$.missing" }), json!({})).unwrap_err();
    assert_eq!(err.name, ErrorName::ParameterPathFailure);

    let err = run(json!({ "x.$": 5 }), json!({})).unwrap_err();
    assert_eq!(err.name, ErrorName::ParameterPathFailure);

    let err = run(json!({ "x.$": "States.Nope(1)" }), json!({})).unwrap_err();
    assert_eq!(err.name, ErrorName::IntrinsicFailure);

    let err = run(json!({ "x.$": "States.Format('{} {}', 1)" }), json!({})).unwrap_err();
    assert_eq!(err.name, ErrorName::IntrinsicFailure);
  }
}
