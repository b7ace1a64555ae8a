//! Intrinsic call expressions.
//!
//! ```text
//!   States.Format('{} of {}', $.done, States.ArrayLength($.items))
//!   └─────┬─────┘ └───┬───┘  └──┬──┘  └────────────┬─────────────┘
//!       name       literal     path            nested call
//! ```
//!
//! Arguments are split on top-level commas; commas inside quotes or
//! nested parentheses belong to the argument they appear in.

use serde_json::{Number, Value};
use waypoint_path::Path;

use crate::error::IntrinsicError;

/// A parsed intrinsic function call.
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicCall {
  pub name: String,
  pub args: Vec<Argument>,
}

/// One argument of an intrinsic call.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
  Literal(Value),
  Path(Path),
  Call(IntrinsicCall),
}

/// Whether `text` has the shape `Name(...)`.
///
/// This does not validate the arguments; use [`parse`] for that.
pub fn is_call(text: &str) -> bool {
  let text = text.trim();
  text.ends_with(')') && text.find('(').is_some_and(|open| open > 0)
}

/// Parses `Name(arg, ...)`.
pub fn parse(expr: &str) -> Result<IntrinsicCall, IntrinsicError> {
  let fail = |message: &str| IntrinsicError::Parse {
    expr: expr.to_string(),
    message: message.to_string(),
  };

  let text = expr.trim();
  let open = text
    .find('(')
    .ok_or_else(|| fail("missing '('"))?;
  if !text.ends_with(')') {
    return Err(fail("missing closing ')'"));
  }

  let name = text[..open].trim();
  if name.is_empty() || name.contains(char::is_whitespace) {
    return Err(fail("invalid function name"));
  }

  let args = split_args(&text[open + 1..text.len() - 1])
    .ok_or_else(|| fail("unbalanced quotes or parentheses"))?
    .into_iter()
    .map(|arg| parse_arg(arg.trim()).map_err(|message| fail(&message)))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(IntrinsicCall {
    name: name.to_string(),
    args,
  })
}

fn split_args(text: &str) -> Option<Vec<&str>> {
  if text.trim().is_empty() {
    return Some(Vec::new());
  }

  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut quoted = false;
  let mut escaped = false;
  let mut start = 0;

  for (i, c) in text.char_indices() {
    if quoted {
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '\'' {
        quoted = false;
      }
      continue;
    }

    match c {
      '\'' => quoted = true,
      '(' => depth += 1,
      ')' => depth = depth.checked_sub(1)?,
      ',' if depth == 0 => {
        parts.push(&text[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }

  if quoted || depth != 0 {
    return None;
  }
  parts.push(&text[start..]);
  Some(parts)
}

fn parse_arg(arg: &str) -> Result<Argument, String> {
  if arg.starts_with('\'') {
    if arg.len() < 2 || !arg.ends_with('\'') {
      return Err(format!("unterminated string argument {}", arg));
    }
    return Ok(Argument::Literal(Value::String(unescape(&arg[1..arg.len() - 1]))));
  }

  if arg.starts_with('$') {
    return Path::parse(arg)
      .map(Argument::Path)
      .map_err(|e| e.to_string());
  }

  match arg {
    "true" => return Ok(Argument::Literal(Value::Bool(true))),
    "false" => return Ok(Argument::Literal(Value::Bool(false))),
    "null" => return Ok(Argument::Literal(Value::Null)),
    "" => return Err("empty argument".to_string()),
    _ => {}
  }

  if let Ok(n) = arg.parse::<i64>() {
    return Ok(Argument::Literal(Value::Number(n.into())));
  }
  if let Some(n) = arg.parse::<f64>().ok().and_then(Number::from_f64) {
    return Ok(Argument::Literal(Value::Number(n)));
  }

  parse(arg).map(Argument::Call).map_err(|e| e.to_string())
}

/// Resolves `\'` and `\\`; other backslash sequences are kept as written.
fn unescape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '\\' {
      if let Some(&next) = chars.peek() {
        if next == '\'' || next == '\\' {
          out.push(next);
          chars.next();
          continue;
        }
      }
    }
    out.push(c);
  }
  out
}
