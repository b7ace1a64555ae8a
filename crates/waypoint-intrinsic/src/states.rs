//! Built-in `States.*` functions.

use serde_json::{Number, Value};

use crate::error::IntrinsicError;

const PLACEHOLDER: &str = "{}";
const ESCAPED_PLACEHOLDER: &str = "\\{}";

fn invalid(function: &str, message: impl Into<String>) -> IntrinsicError {
  IntrinsicError::InvalidArguments {
    function: function.to_string(),
    message: message.into(),
  }
}

fn expect_count(function: &str, args: &[Value], count: usize) -> Result<(), IntrinsicError> {
  if args.len() != count {
    return Err(invalid(
      function,
      format!("expected {} argument(s), got {}", count, args.len()),
    ));
  }
  Ok(())
}

/// `States.Format(template, values...)`
///
/// Each unescaped `{}` is replaced by the next value. `\{}` is left as
/// written and does not consume a value.
pub fn format(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.Format";

  let Some((Value::String(template), values)) = args.split_first() else {
    return Err(invalid(NAME, "first argument must be a string"));
  };

  let placeholders = template.matches(PLACEHOLDER).count() - template.matches(ESCAPED_PLACEHOLDER).count();
  if placeholders != values.len() {
    return Err(invalid(
      NAME,
      format!("template has {} placeholder(s) but {} value(s) were given", placeholders, values.len()),
    ));
  }

  let mut out = String::with_capacity(template.len());
  let mut values = values.iter();
  let mut rest = template.as_str();
  while !rest.is_empty() {
    if let Some(tail) = rest.strip_prefix(ESCAPED_PLACEHOLDER) {
      out.push_str(ESCAPED_PLACEHOLDER);
      rest = tail;
    } else if let Some(tail) = rest.strip_prefix(PLACEHOLDER) {
      // counted above, so a value is always available
      if let Some(value) = values.next() {
        out.push_str(&render(NAME, value)?);
      }
      rest = tail;
    } else {
      let c = rest.chars().next().unwrap_or_default();
      out.push(c);
      rest = &rest[c.len_utf8()..];
    }
  }

  Ok(Value::String(out))
}

fn render(function: &str, value: &Value) -> Result<String, IntrinsicError> {
  match value {
    Value::String(s) => Ok(s.clone()),
    Value::Number(n) => Ok(n.to_string()),
    Value::Bool(b) => Ok(b.to_string()),
    Value::Null => Ok("null".to_string()),
    Value::Array(_) | Value::Object(_) => Err(invalid(function, "cannot format arrays or objects")),
  }
}

/// `States.StringToJson(text)`
pub fn string_to_json(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.StringToJson";
  expect_count(NAME, args, 1)?;
  let Value::String(text) = &args[0] else {
    return Err(invalid(NAME, "argument must be a string"));
  };
  serde_json::from_str(text).map_err(|e| invalid(NAME, e.to_string()))
}

/// `States.JsonToString(value)`
pub fn json_to_string(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.JsonToString";
  expect_count(NAME, args, 1)?;
  serde_json::to_string(&args[0])
    .map(Value::String)
    .map_err(|e| invalid(NAME, e.to_string()))
}

/// `States.Array(values...)`
pub fn array(args: &[Value]) -> Result<Value, IntrinsicError> {
  Ok(Value::Array(args.to_vec()))
}

/// `States.ArrayLength(array)`
pub fn array_length(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.ArrayLength";
  expect_count(NAME, args, 1)?;
  let Value::Array(items) = &args[0] else {
    return Err(invalid(NAME, "argument must be an array"));
  };
  Ok(Value::from(items.len()))
}

/// `States.ArrayContains(array, value)`
pub fn array_contains(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.ArrayContains";
  expect_count(NAME, args, 2)?;
  let Value::Array(items) = &args[0] else {
    return Err(invalid(NAME, "first argument must be an array"));
  };
  Ok(Value::Bool(items.contains(&args[1])))
}

/// `States.MathAdd(a, b)`
pub fn math_add(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.MathAdd";
  expect_count(NAME, args, 2)?;
  let (Value::Number(a), Value::Number(b)) = (&args[0], &args[1]) else {
    return Err(invalid(NAME, "arguments must be numbers"));
  };

  if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
    return a
      .checked_add(b)
      .map(Value::from)
      .ok_or_else(|| invalid(NAME, "integer overflow"));
  }

  let sum = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
  Number::from_f64(sum)
    .map(Value::Number)
    .ok_or_else(|| invalid(NAME, "result is not a finite number"))
}

/// `States.StringSplit(text, delimiter)`
pub fn string_split(args: &[Value]) -> Result<Value, IntrinsicError> {
  const NAME: &str = "States.StringSplit";
  expect_count(NAME, args, 2)?;
  let (Value::String(text), Value::String(delimiter)) = (&args[0], &args[1]) else {
    return Err(invalid(NAME, "arguments must be strings"));
  };
  if delimiter.is_empty() {
    return Err(invalid(NAME, "delimiter must not be empty"));
  }

  Ok(Value::Array(
    text
      .split(delimiter.as_str())
      .filter(|part| !part.is_empty())
      .map(|part| Value::String(part.to_string()))
      .collect(),
  ))
}

/// `States.UUID()`
pub fn uuid(args: &[Value]) -> Result<Value, IntrinsicError> {
  expect_count("States.UUID", args, 0)?;
  Ok(Value::String(uuid::Uuid::new_v4().to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_format() {
    let cases = [
      (vec![json!("aaa={}"), json!("bbb")], "aaa=bbb"),
      (vec![json!("aaa=\\{}{}\\{}"), json!("bbb")], "aaa=\\{}bbb\\{}"),
      (vec![json!("aaa={}"), json!(111)], "aaa=111"),
      (vec![json!("aaa={}"), json!(3.14)], "aaa=3.14"),
      (vec![json!("{}, {}, {}"), json!("bbb"), json!(111), json!(3.14)], "bbb, 111, 3.14"),
      (vec![json!("{} {}"), json!(true), Value::Null], "true null"),
    ];

    for (args, want) in cases {
      assert_eq!(format(&args).unwrap(), json!(want), "args {:?}", args);
    }
  }

  #[test]
  fn test_format_rejects_mismatch_and_objects() {
    assert!(format(&[json!("{} {}"), json!(1)]).is_err());
    assert!(format(&[json!("{}"), json!(1), json!(2)]).is_err());
    assert!(format(&[json!("{}"), json!({ "a": 1 })]).is_err());
    assert!(format(&[json!(1)]).is_err());
    assert!(format(&[]).is_err());
  }

  #[test]
  fn test_string_to_json() {
    assert_eq!(
      string_to_json(&[json!(r#"{"aaa":111, "bbb":{"ccc": "xxx"}}"#)]).unwrap(),
      json!({ "aaa": 111, "bbb": { "ccc": "xxx" } })
    );
    assert!(string_to_json(&[json!("{not json")]).is_err());
    assert!(string_to_json(&[json!(1)]).is_err());
  }

  #[test]
  fn test_json_to_string() {
    let text = json_to_string(&[json!({ "aaa": 111, "bbb": { "ccc": "xxx" } })]).unwrap();
    let parsed: Value = serde_json::from_str(text.as_str().unwrap()).unwrap();
    assert_eq!(parsed, json!({ "aaa": 111, "bbb": { "ccc": "xxx" } }));
  }

  #[test]
  fn test_array_helpers() {
    assert_eq!(array(&[json!(1), json!("a")]).unwrap(), json!([1, "a"]));
    assert_eq!(array_length(&[json!([1, 2, 3])]).unwrap(), json!(3));
    assert_eq!(array_contains(&[json!([1, 2]), json!(2)]).unwrap(), json!(true));
    assert_eq!(array_contains(&[json!([1, 2]), json!(5)]).unwrap(), json!(false));
    assert!(array_length(&[json!("abc")]).is_err());
  }

  #[test]
  fn test_math_add() {
    assert_eq!(math_add(&[json!(1), json!(2)]).unwrap(), json!(3));
    assert_eq!(math_add(&[json!(1.5), json!(2)]).unwrap(), json!(3.5));
    assert!(math_add(&[json!(i64::MAX), json!(1)]).is_err());
  }

  #[test]
  fn test_string_split() {
    assert_eq!(
      string_split(&[json!("a,b,,c"), json!(",")]).unwrap(),
      json!(["a", "b", "c"])
    );
    assert!(string_split(&[json!("a"), json!("")]).is_err());
  }

  #[test]
  fn test_uuid() {
    let id = uuid(&[]).unwrap();
    assert_eq!(id.as_str().map(str::len), Some(36));
  }
}
