//! Choice conditions.
//!
//! A [`Condition`] is decoded from one Choice rule and evaluated against the
//! Choice state's effective input:
//!
//! ```text
//!   { "Variable": "$.total", "NumericGreaterThanPath": "$.limit", "Next": "Review" }
//!                 │                  │          │
//!              variable       comparison    operand (path)
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use waypoint_path::{ContextObject, Path, PathError, unjoin};

use crate::timestamp::Timestamp;

/// Errors raised while evaluating a condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
  #[error(transparent)]
  Path(#[from] PathError),

  #[error("value at '{path}' is not {expected}")]
  TypeMismatch { path: String, expected: &'static str },

  #[error("invalid match pattern '{pattern}': {message}")]
  InvalidPattern { pattern: String, message: String },
}

/// The JSON type a comparison operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
  String,
  Numeric,
  Boolean,
  Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
  Equals,
  LessThan,
  LessThanEquals,
  GreaterThan,
  GreaterThanEquals,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
  Literal(Value),
  Path(Path),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTest {
  IsNull,
  IsPresent,
  IsNumeric,
  IsString,
  IsBoolean,
  IsTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
  /// True when every child is true. Stops at the first false child.
  And(Vec<Condition>),
  /// True when any child is true. Every child is evaluated.
  Or(Vec<Condition>),
  Not(Box<Condition>),
  Compare {
    kind: ValueKind,
    op: Comparison,
    variable: Path,
    operand: Operand,
  },
  /// Glob match where `*` matches any run of characters.
  StringMatches { variable: Path, pattern: String },
  Test {
    test: TypeTest,
    variable: Path,
    expected: bool,
  },
}

impl Condition {
  /// `{ "Variable": variable, "BooleanEquals": value }`
  pub fn boolean_equals(variable: Path, value: bool) -> Self {
    Condition::Compare {
      kind: ValueKind::Boolean,
      op: Comparison::Equals,
      variable,
      operand: Operand::Literal(Value::Bool(value)),
    }
  }

  pub fn evaluate(&self, context: &ContextObject, input: &Value) -> Result<bool, ConditionError> {
    match self {
      Condition::And(children) => {
        for child in children {
          if !child.evaluate(context, input)? {
            return Ok(false);
          }
        }
        Ok(true)
      }
      Condition::Or(children) => {
        let mut result = false;
        for child in children {
          result |= child.evaluate(context, input)?;
        }
        Ok(result)
      }
      Condition::Not(child) => Ok(!child.evaluate(context, input)?),
      Condition::Compare {
        kind,
        op,
        variable,
        operand,
      } => {
        let left = unjoin(context, input, variable)?;
        let right = match operand {
          Operand::Literal(value) => value.clone(),
          Operand::Path(path) => unjoin(context, input, path)?,
        };
        compare(*kind, *op, (variable, &left), (operand, &right))
      }
      Condition::StringMatches { variable, pattern } => {
        let value = unjoin(context, input, variable)?;
        let Value::String(text) = value else {
          return Err(mismatch(variable.as_str(), "a string"));
        };
        let tokens = tokenize(pattern)?;
        Ok(wildcard_match(&tokens, &text.chars().collect::<Vec<_>>()))
      }
      Condition::Test {
        test,
        variable,
        expected,
      } => {
        let actual = match test {
          TypeTest::IsPresent => unjoin(context, input, variable).is_ok(),
          _ => {
            let value = unjoin(context, input, variable)?;
            match test {
              TypeTest::IsNull => value.is_null(),
              TypeTest::IsNumeric => value.is_number(),
              TypeTest::IsString => value.is_string(),
              TypeTest::IsBoolean => value.is_boolean(),
              TypeTest::IsTimestamp => value.as_str().is_some_and(|s| Timestamp::parse(s).is_ok()),
              TypeTest::IsPresent => true,
            }
          }
        };
        Ok(actual == *expected)
      }
    }
  }
}

fn mismatch(path: &str, expected: &'static str) -> ConditionError {
  ConditionError::TypeMismatch {
    path: path.to_string(),
    expected,
  }
}

fn operand_label(operand: &Operand) -> String {
  match operand {
    Operand::Literal(value) => value.to_string(),
    Operand::Path(path) => path.to_string(),
  }
}

fn compare(
  kind: ValueKind,
  op: Comparison,
  (variable, left): (&Path, &Value),
  (operand, right): (&Operand, &Value),
) -> Result<bool, ConditionError> {
  let ordering = match kind {
    ValueKind::String => {
      let l = left.as_str().ok_or_else(|| mismatch(variable.as_str(), "a string"))?;
      let r = right
        .as_str()
        .ok_or_else(|| mismatch(&operand_label(operand), "a string"))?;
      l.cmp(r)
    }
    ValueKind::Numeric => {
      let l = left.as_f64().ok_or_else(|| mismatch(variable.as_str(), "a number"))?;
      let r = right
        .as_f64()
        .ok_or_else(|| mismatch(&operand_label(operand), "a number"))?;
      l.partial_cmp(&r).unwrap_or(Ordering::Less)
    }
    ValueKind::Boolean => {
      let l = left.as_bool().ok_or_else(|| mismatch(variable.as_str(), "a boolean"))?;
      let r = right
        .as_bool()
        .ok_or_else(|| mismatch(&operand_label(operand), "a boolean"))?;
      l.cmp(&r)
    }
    ValueKind::Timestamp => {
      let l = left
        .as_str()
        .and_then(|s| Timestamp::parse(s).ok())
        .ok_or_else(|| mismatch(variable.as_str(), "a timestamp"))?;
      let r = right
        .as_str()
        .and_then(|s| Timestamp::parse(s).ok())
        .ok_or_else(|| mismatch(&operand_label(operand), "a timestamp"))?;
      l.cmp(&r)
    }
  };

  Ok(match op {
    Comparison::Equals => ordering == Ordering::Equal,
    Comparison::LessThan => ordering == Ordering::Less,
    Comparison::LessThanEquals => ordering != Ordering::Greater,
    Comparison::GreaterThan => ordering == Ordering::Greater,
    Comparison::GreaterThanEquals => ordering != Ordering::Less,
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
  Char(char),
  Star,
}

fn tokenize(pattern: &str) -> Result<Vec<Token>, ConditionError> {
  let invalid = |message: &str| ConditionError::InvalidPattern {
    pattern: pattern.to_string(),
    message: message.to_string(),
  };

  let mut tokens = Vec::new();
  let mut chars = pattern.chars();
  while let Some(c) = chars.next() {
    match c {
      '\\' => match chars.next() {
        Some(escaped @ ('*' | '\\')) => tokens.push(Token::Char(escaped)),
        Some(_) => return Err(invalid("only '*' and '\\' may be escaped")),
        None => return Err(invalid("open backslash at end of pattern")),
      },
      '*' => tokens.push(Token::Star),
      c => tokens.push(Token::Char(c)),
    }
  }
  Ok(tokens)
}

fn wildcard_match(tokens: &[Token], text: &[char]) -> bool {
  let (mut t, mut p) = (0, 0);
  let mut backtrack: Option<(usize, usize)> = None;

  while t < text.len() {
    match tokens.get(p) {
      Some(Token::Char(c)) if *c == text[t] => {
        t += 1;
        p += 1;
      }
      Some(Token::Star) => {
        backtrack = Some((p, t));
        p += 1;
      }
      _ => match backtrack {
        Some((star, mark)) => {
          p = star + 1;
          t = mark + 1;
          backtrack = Some((star, mark + 1));
        }
        None => return false,
      },
    }
  }

  tokens[p..].iter().all(|token| *token == Token::Star)
}

const KINDS: [(&str, ValueKind); 4] = [
  ("String", ValueKind::String),
  ("Numeric", ValueKind::Numeric),
  ("Boolean", ValueKind::Boolean),
  ("Timestamp", ValueKind::Timestamp),
];

const COMPARISONS: [(&str, Comparison); 5] = [
  ("Equals", Comparison::Equals),
  ("LessThan", Comparison::LessThan),
  ("LessThanEquals", Comparison::LessThanEquals),
  ("GreaterThan", Comparison::GreaterThan),
  ("GreaterThanEquals", Comparison::GreaterThanEquals),
];

const TYPE_TESTS: [(&str, TypeTest); 6] = [
  ("IsNull", TypeTest::IsNull),
  ("IsPresent", TypeTest::IsPresent),
  ("IsNumeric", TypeTest::IsNumeric),
  ("IsString", TypeTest::IsString),
  ("IsBoolean", TypeTest::IsBoolean),
  ("IsTimestamp", TypeTest::IsTimestamp),
];

/// Keys of a rule that are not operators.
const RULE_FIELDS: [&str; 3] = ["Variable", "Next", "Comment"];

/// Decodes one Choice rule (or a nested rule inside `And`/`Or`/`Not`).
pub(crate) fn decode(rule: &Map<String, Value>) -> Result<Condition, String> {
  let operators: Vec<&String> = rule
    .keys()
    .filter(|key| !RULE_FIELDS.contains(&key.as_str()))
    .collect();
  let operator = match operators.as_slice() {
    [operator] => operator.as_str(),
    [] => return Err("rule has no operator".to_string()),
    many => {
      return Err(format!(
        "rule has more than one operator: {}",
        many.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
      ));
    }
  };
  let argument = &rule[operator];

  match operator {
    "And" | "Or" => {
      let Value::Array(children) = argument else {
        return Err(format!("'{}' must be an array of rules", operator));
      };
      if children.is_empty() {
        return Err(format!("'{}' must not be empty", operator));
      }
      let children = children
        .iter()
        .map(|child| match child {
          Value::Object(map) => decode(map),
          _ => Err(format!("'{}' entries must be objects", operator)),
        })
        .collect::<Result<Vec<_>, _>>()?;
      Ok(if operator == "And" {
        Condition::And(children)
      } else {
        Condition::Or(children)
      })
    }
    "Not" => match argument {
      Value::Object(map) => Ok(Condition::Not(Box::new(decode(map)?))),
      _ => Err("'Not' must be a rule object".to_string()),
    },
    _ => decode_data_test(rule, operator, argument),
  }
}

fn decode_data_test(
  rule: &Map<String, Value>,
  operator: &str,
  argument: &Value,
) -> Result<Condition, String> {
  let variable = match rule.get("Variable") {
    Some(Value::String(text)) => Path::parse(text).map_err(|e| e.to_string())?,
    Some(_) => return Err("'Variable' must be a string".to_string()),
    None => return Err(format!("'{}' requires 'Variable'", operator)),
  };

  if let Some((_, test)) = TYPE_TESTS.iter().find(|(name, _)| *name == operator) {
    let expected = argument
      .as_bool()
      .ok_or_else(|| format!("'{}' must be a boolean", operator))?;
    return Ok(Condition::Test {
      test: *test,
      variable,
      expected,
    });
  }

  if operator == "StringMatches" {
    let pattern = argument
      .as_str()
      .ok_or_else(|| "'StringMatches' must be a string".to_string())?;
    tokenize(pattern).map_err(|e| e.to_string())?;
    return Ok(Condition::StringMatches {
      variable,
      pattern: pattern.to_string(),
    });
  }

  let (base, is_path) = match operator.strip_suffix("Path") {
    Some(base) => (base, true),
    None => (operator, false),
  };
  let (kind, op) = KINDS
    .iter()
    .find_map(|(prefix, kind)| {
      let rest = base.strip_prefix(prefix)?;
      COMPARISONS
        .iter()
        .find(|(name, _)| *name == rest)
        .map(|(_, op)| (*kind, *op))
    })
    .ok_or_else(|| format!("unknown operator '{}'", operator))?;
  if kind == ValueKind::Boolean && op != Comparison::Equals {
    return Err(format!("unknown operator '{}'", operator));
  }

  let operand = if is_path {
    let text = argument
      .as_str()
      .ok_or_else(|| format!("'{}' must be a path string", operator))?;
    Operand::Path(Path::parse(text).map_err(|e| e.to_string())?)
  } else {
    let valid = match kind {
      ValueKind::String => argument.is_string(),
      ValueKind::Numeric => argument.is_number(),
      ValueKind::Boolean => argument.is_boolean(),
      ValueKind::Timestamp => argument.as_str().is_some_and(|s| Timestamp::parse(s).is_ok()),
    };
    if !valid {
      return Err(format!("'{}' has an operand of the wrong type", operator));
    }
    Operand::Literal(argument.clone())
  };

  Ok(Condition::Compare {
    kind,
    op,
    variable,
    operand,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn rule(value: Value) -> Condition {
    match value {
      Value::Object(map) => decode(&map).unwrap(),
      _ => panic!("rule must be an object"),
    }
  }

  fn eval(condition: &Condition, input: Value) -> bool {
    condition.evaluate(&ContextObject::new(), &input).unwrap()
  }

  #[test]
  fn test_boolean_equals() {
    let cond = rule(json!({ "Variable": "$.bool", "BooleanEquals": false, "Next": "State1" }));
    assert_eq!(cond, Condition::boolean_equals(Path::parse("$.bool").unwrap(), false));
    assert!(eval(&cond, json!({ "bool": false })));
    assert!(!eval(&cond, json!({ "bool": true })));
  }

  #[test]
  fn test_comparisons() {
    let input = json!({ "n": 5, "m": 7, "s": "beta", "t": "2020-01-01T00:00:00Z" });

    assert!(eval(&rule(json!({ "Variable": "$.n", "NumericLessThan": 6 })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.n", "NumericLessThanPath": "$.m" })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.n", "NumericGreaterThanEquals": 5 })), input.clone()));
    assert!(!eval(&rule(json!({ "Variable": "$.n", "NumericEquals": 5.5 })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.s", "StringGreaterThan": "alpha" })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.s", "StringEquals": "beta" })), input.clone()));
    assert!(eval(
      &rule(json!({ "Variable": "$.t", "TimestampLessThan": "2020-01-02T00:00:00Z" })),
      input
    ));
  }

  #[test]
  fn test_combinators() {
    let input = json!({ "a": 1, "b": "x" });
    let and = rule(json!({ "And": [
      { "Variable": "$.a", "NumericEquals": 1 },
      { "Variable": "$.b", "StringEquals": "x" }
    ]}));
    assert!(eval(&and, input.clone()));

    let or = rule(json!({ "Or": [
      { "Variable": "$.a", "NumericEquals": 2 },
      { "Not": { "Variable": "$.b", "StringEquals": "y" } }
    ]}));
    assert!(eval(&or, input));
  }

  #[test]
  fn test_and_short_circuits_but_or_does_not() {
    let input = json!({ "a": 1 });
    // second child would fail: $.missing does not resolve
    let and = rule(json!({ "And": [
      { "Variable": "$.a", "NumericEquals": 2 },
      { "Variable": "$.missing", "NumericEquals": 1 }
    ]}));
    assert_eq!(and.evaluate(&ContextObject::new(), &input), Ok(false));

    let or = rule(json!({ "Or": [
      { "Variable": "$.a", "NumericEquals": 1 },
      { "Variable": "$.missing", "NumericEquals": 1 }
    ]}));
    assert!(or.evaluate(&ContextObject::new(), &input).is_err());
  }

  #[test]
  fn test_type_tests() {
    let input = json!({ "n": null, "num": 1.5, "s": "x", "b": true, "t": "2016-03-14T01:59:00Z" });
    assert!(eval(&rule(json!({ "Variable": "$.n", "IsNull": true })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.num", "IsNumeric": true })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.s", "IsString": true })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.b", "IsBoolean": true })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.t", "IsTimestamp": true })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.s", "IsTimestamp": false })), input.clone()));
    assert!(eval(&rule(json!({ "Variable": "$.gone", "IsPresent": false })), input.clone()));
    assert!(!eval(&rule(json!({ "Variable": "$.gone", "IsPresent": true })), input));
  }

  #[test]
  fn test_string_matches() {
    let cond = |pattern: &str| {
      rule(json!({ "Variable": "$.f", "StringMatches": pattern }))
    };
    let input = json!({ "f": "log-2024.txt" });

    assert!(eval(&cond("log-*.txt"), input.clone()));
    assert!(eval(&cond("*"), input.clone()));
    assert!(eval(&cond("*.txt"), input.clone()));
    assert!(!eval(&cond("*.csv"), input.clone()));
    assert!(eval(&cond("l*g*4*"), input));
    assert!(eval(&cond("a\\*b"), json!({ "f": "a*b" })));
    assert!(!eval(&cond("a\\*b"), json!({ "f": "axb" })));
    assert!(eval(&cond("c:\\\\*"), json!({ "f": "c:\\dir" })));
  }

  #[test]
  fn test_string_matches_open_backslash() {
    let map = json!({ "Variable": "$.f", "StringMatches": "abc\\" });
    assert!(decode(map.as_object().unwrap()).is_err());
  }

  #[test]
  fn test_type_mismatch_is_an_error() {
    let cond = rule(json!({ "Variable": "$.n", "StringEquals": "5" }));
    let err = cond.evaluate(&ContextObject::new(), &json!({ "n": 5 })).unwrap_err();
    assert!(matches!(err, ConditionError::TypeMismatch { .. }));
  }

  #[test]
  fn test_context_variable() {
    let ctx = ContextObject::new().with("$.Map.Item.Index", json!(0)).unwrap();
    let cond = rule(json!({ "Variable": "$$.Map.Item.Index", "NumericEquals": 0 }));
    assert_eq!(cond.evaluate(&ctx, &json!({})), Ok(true));
  }

  #[test]
  fn test_malformed_rules() {
    for bad in [
      json!({ "Next": "x" }),
      json!({ "Variable": "$.a", "NumericEquals": "1" }),
      json!({ "Variable": "$.a", "BooleanLessThan": true }),
      json!({ "Variable": "$.a", "Frobnicate": 1 }),
      json!({ "NumericEquals": 1 }),
      json!({ "Variable": "$.a", "NumericEquals": 1, "StringEquals": "1" }),
      json!({ "And": [] }),
      json!({ "Not": [] }),
      json!({ "Variable": "$.a", "TimestampEquals": "not a time" }),
    ] {
      assert!(decode(bad.as_object().unwrap()).is_err(), "{}", bad);
    }
  }
}
