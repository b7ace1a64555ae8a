//! Reading values out of, and writing values into, state documents.

use serde_json::Value;

use crate::context::ContextObject;
use crate::error::PathError;
use crate::path::Path;

/// Reads the single node selected by `path`.
///
/// Context paths (`$$...`) read from `context` instead of `document`.
/// Zero or several matches are an error.
pub fn unjoin(context: &ContextObject, document: &Value, path: &Path) -> Result<Value, PathError> {
  let target = if path.is_context() {
    context.value()
  } else {
    document
  };

  match path.get(target).as_slice() {
    [value] => Ok((*value).clone()),
    matches => Err(PathError::InvalidLength {
      path: path.to_string(),
      count: matches.len(),
    }),
  }
}

/// Writes `value` into `document` at `path` and returns the result.
///
/// Context paths write into a copy of the context document instead, and
/// that copy is returned.
pub fn join(
  context: &ContextObject,
  document: Value,
  value: Value,
  path: &Path,
) -> Result<Value, PathError> {
  let mut target = if path.is_context() {
    context.value().clone()
  } else {
    document
  };

  path.expr().set(&mut target, value)?;
  Ok(target)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn path(text: &str) -> Path {
    Path::parse(text).unwrap()
  }

  #[test]
  fn test_unjoin_single_value() {
    let ctx = ContextObject::new();
    let doc = json!({ "a": { "b": [1, 2, 3] } });
    assert_eq!(unjoin(&ctx, &doc, &path("$.a.b[1]")).unwrap(), json!(2));
    assert_eq!(unjoin(&ctx, &doc, &path("$")).unwrap(), doc);
  }

  #[test]
  fn test_unjoin_rejects_zero_or_many() {
    let ctx = ContextObject::new();
    let doc = json!({ "a": [1, 2] });

    let err = unjoin(&ctx, &doc, &path("$.missing")).unwrap_err();
    assert_eq!(
      err,
      PathError::InvalidLength {
        path: "$.missing".to_string(),
        count: 0
      }
    );
    assert!(err.to_string().starts_with("invalid length of path result"));

    let err = unjoin(&ctx, &doc, &path("$.a[*]")).unwrap_err();
    assert!(matches!(err, PathError::InvalidLength { count: 2, .. }));
  }

  #[test]
  fn test_unjoin_context_path() {
    let ctx = ContextObject::from_value(json!({ "Map": { "Item": { "Value": "x" } } }));
    let doc = json!({ "Map": "not this one" });
    assert_eq!(unjoin(&ctx, &doc, &path("$$.Map.Item.Value")).unwrap(), json!("x"));
  }

  #[test]
  fn test_join_does_not_touch_caller_copy() {
    let ctx = ContextObject::new();
    let original = json!({ "a": 1 });
    let joined = join(&ctx, original.clone(), json!(2), &path("$.b.c")).unwrap();

    assert_eq!(original, json!({ "a": 1 }));
    assert_eq!(joined, json!({ "a": 1, "b": { "c": 2 } }));
  }

  #[test]
  fn test_join_context_path_writes_context_copy() {
    let ctx = ContextObject::from_value(json!({ "Execution": { "Id": "e1" } }));
    let joined = join(&ctx, json!({ "ignored": true }), json!("n"), &path("$$.State.Name")).unwrap();

    assert_eq!(joined, json!({ "Execution": { "Id": "e1" }, "State": { "Name": "n" } }));
    assert_eq!(ctx.value(), &json!({ "Execution": { "Id": "e1" } }));
  }

  #[test]
  fn test_join_of_unjoin_is_identity() {
    let ctx = ContextObject::new();
    let doc = json!({ "a": { "b": [10, { "c": "x" }] }, "d": null });

    for text in ["$", "$.a", "$.a.b", "$.a.b[0]", "$.a.b[1].c", "$.d"] {
      let p = path(text);
      let value = unjoin(&ctx, &doc, &p).unwrap();
      assert_eq!(join(&ctx, doc.clone(), value, &p).unwrap(), doc, "path {}", text);
    }
  }
}
