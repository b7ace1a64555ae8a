//! Data-flow paths used by workflow documents.
//!
//! A [`Path`] is a JSONPath expression that may carry the `$$` prefix, which
//! points it at the context object instead of the state's input. A
//! [`ReferencePath`] is a path restricted to single-node selection, used
//! wherever a value is written.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::PathError;
use crate::expr::{Anchor, JsonPath, Segment};

/// Prefix that redirects a path to the context object.
pub const CONTEXT_PREFIX: &str = "$$";

/// A JSONPath with an optional context redirection.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
  source: String,
  expr: JsonPath,
  context: bool,
}

impl Path {
  pub fn parse(text: &str) -> Result<Self, PathError> {
    let (context, expr_text) = if text.starts_with(CONTEXT_PREFIX) {
      (true, &text[1..])
    } else {
      (false, text)
    };

    Ok(Self {
      source: text.to_string(),
      expr: JsonPath::parse(expr_text)?,
      context,
    })
  }

  /// The path `$`.
  pub fn root() -> Self {
    Self {
      source: "$".to_string(),
      expr: JsonPath::root(),
      context: false,
    }
  }

  /// Whether the path reads from (or writes to) the context object.
  pub fn is_context(&self) -> bool {
    self.context
  }

  pub fn expr(&self) -> &JsonPath {
    &self.expr
  }

  pub fn as_str(&self) -> &str {
    &self.source
  }

  /// All nodes of `document` selected by the expression.
  ///
  /// The context prefix is not applied here; see [`crate::unjoin`].
  pub fn get<'a>(&self, document: &'a Value) -> Vec<&'a Value> {
    self.expr.get(document)
  }
}

impl FromStr for Path {
  type Err = PathError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for Path {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

impl Serialize for Path {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&self.source)
  }
}

impl<'de> Deserialize<'de> for Path {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    Path::parse(&text).map_err(serde::de::Error::custom)
  }
}

/// A path that selects at most one node.
///
/// Reference paths may not use `@`, unions (`,`), slices (`:`) or
/// filters (`?`).
#[derive(Debug, Clone, PartialEq)]
pub struct ReferencePath(Path);

impl ReferencePath {
  pub fn parse(text: &str) -> Result<Self, PathError> {
    let path = Path::parse(text)?;

    let not_reference = |operator| PathError::NotReferencePath {
      path: text.to_string(),
      operator,
    };
    if path.expr().anchor() == Anchor::Current {
      return Err(not_reference("'@'"));
    }
    for segment in path.expr().segments() {
      match segment {
        Segment::Union(_) => return Err(not_reference("union ','")),
        Segment::Slice { .. } => return Err(not_reference("slice ':'")),
        Segment::Filter(_) => return Err(not_reference("filter '?'")),
        Segment::Child(_) | Segment::Index(_) | Segment::Wildcard => {}
      }
    }

    Ok(Self(path))
  }

  pub fn root() -> Self {
    Self(Path::root())
  }

  pub fn as_path(&self) -> &Path {
    &self.0
  }
}

impl Deref for ReferencePath {
  type Target = Path;

  fn deref(&self) -> &Path {
    &self.0
  }
}

impl From<ReferencePath> for Path {
  fn from(path: ReferencePath) -> Self {
    path.0
  }
}

impl FromStr for ReferencePath {
  type Err = PathError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for ReferencePath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

impl Serialize for ReferencePath {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.0.serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for ReferencePath {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let text = String::deserialize(deserializer)?;
    ReferencePath::parse(&text).map_err(serde::de::Error::custom)
  }
}
