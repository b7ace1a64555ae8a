//! JSONPath expressions.
//!
//! A [`JsonPath`] is parsed once and then applied to any number of
//! documents:
//!
//! ```text
//!   $.orders[0].lines[?(@.qty > 1)].sku
//!   │ └──┬──┘└┬┘ └─┬─┘└─────┬──────┘└┬┘
//!   │  child index child  filter   child
//!   root
//! ```
//!
//! [`JsonPath::get`] returns every match in document order.
//! [`JsonPath::set`] writes a value at every match, creating missing
//! objects and arrays along name and index segments.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Map, Number, Value};

use crate::error::PathError;

/// Where evaluation of a path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
  /// `$`, the document root.
  Root,
  /// `@`, the node currently under evaluation.
  Current,
}

/// One step of a JSONPath expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
  /// `.name` or `['name']`
  Child(String),
  /// `[3]` or `[-1]`
  Index(i64),
  /// `.*` or `[*]`
  Wildcard,
  /// `[0,2]` or `['a','b']`
  Union(Vec<Selector>),
  /// `[start:end:step]`
  Slice {
    start: Option<i64>,
    end: Option<i64>,
    step: i64,
  },
  /// `[?(...)]`
  Filter(Filter),
}

/// A single member of a union segment.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
  Name(String),
  Index(i64),
}

/// A filter predicate, tested against each child of the selected node.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Or(Box<Filter>, Box<Filter>),
  And(Box<Filter>, Box<Filter>),
  Compare {
    left: Operand,
    op: CompareOp,
    right: Operand,
  },
  Exists(Operand),
}

/// A value inside a filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
  Path {
    anchor: Anchor,
    segments: Vec<Segment>,
  },
  Literal(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

/// A parsed JSONPath expression.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPath {
  source: String,
  anchor: Anchor,
  segments: Vec<Segment>,
}

impl JsonPath {
  /// Parse an expression such as `$.a.b[0]`.
  pub fn parse(source: &str) -> Result<Self, PathError> {
    let mut parser = Parser::new(source);
    let (anchor, segments) = parser.parse_path(false)?;
    if !parser.at_end() {
      return Err(parser.error("unexpected trailing input"));
    }

    Ok(Self {
      source: source.to_string(),
      anchor,
      segments,
    })
  }

  /// The expression `$`.
  pub fn root() -> Self {
    Self {
      source: "$".to_string(),
      anchor: Anchor::Root,
      segments: Vec::new(),
    }
  }

  /// The text this expression was parsed from.
  pub fn as_str(&self) -> &str {
    &self.source
  }

  pub fn anchor(&self) -> Anchor {
    self.anchor
  }

  pub fn segments(&self) -> &[Segment] {
    &self.segments
  }

  /// Returns all nodes selected by this expression, in document order.
  pub fn get<'a>(&self, document: &'a Value) -> Vec<&'a Value> {
    select_all(&self.segments, document, document)
  }

  /// Writes `value` at every location selected by this expression.
  ///
  /// An expression with no segments (`$`) replaces the whole document.
  pub fn set(&self, document: &mut Value, value: Value) -> Result<(), PathError> {
    if self.segments.is_empty() {
      *document = value;
      return Ok(());
    }

    // Filters may refer back to `$`, so they need a stable view of the
    // document while it is being written.
    let root = if self.segments.iter().any(|s| matches!(s, Segment::Filter(_))) {
      document.clone()
    } else {
      Value::Null
    };

    write(document, &self.segments, &value, &root).map_err(|message| PathError::Write {
      path: self.source.clone(),
      message,
    })
  }
}

impl fmt::Display for JsonPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

fn select_all<'a>(segments: &[Segment], start: &'a Value, root: &'a Value) -> Vec<&'a Value> {
  let mut current = vec![start];
  for segment in segments {
    let mut next = Vec::new();
    for node in current {
      select(segment, node, root, &mut next);
    }
    current = next;
  }
  current
}

fn select<'a>(segment: &Segment, node: &'a Value, root: &'a Value, out: &mut Vec<&'a Value>) {
  match segment {
    Segment::Child(name) => out.extend(node.get(name.as_str())),
    Segment::Index(index) => out.extend(element(node, *index)),
    Segment::Wildcard => out.extend(children(node)),
    Segment::Union(selectors) => {
      for selector in selectors {
        match selector {
          Selector::Name(name) => out.extend(node.get(name.as_str())),
          Selector::Index(index) => out.extend(element(node, *index)),
        }
      }
    }
    Segment::Slice { start, end, step } => {
      if let Value::Array(items) = node {
        for i in slice_indices(items.len(), *start, *end, *step) {
          out.push(&items[i]);
        }
      }
    }
    Segment::Filter(filter) => {
      out.extend(
        children(node)
          .into_iter()
          .filter(|child| filter.matches(child, root)),
      );
    }
  }
}

fn children(node: &Value) -> Vec<&Value> {
  match node {
    Value::Array(items) => items.iter().collect(),
    Value::Object(map) => map.values().collect(),
    _ => Vec::new(),
  }
}

fn children_mut(node: &mut Value) -> Vec<&mut Value> {
  match node {
    Value::Array(items) => items.iter_mut().collect(),
    Value::Object(map) => map.values_mut().collect(),
    _ => Vec::new(),
  }
}

fn element(node: &Value, index: i64) -> Option<&Value> {
  let items = node.as_array()?;
  resolve_index(items.len(), index).map(|i| &items[i])
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
  let len = len as i64;
  let resolved = if index < 0 { len + index } else { index };
  (0..len).contains(&resolved).then_some(resolved as usize)
}

fn slice_indices(len: usize, start: Option<i64>, end: Option<i64>, step: i64) -> Vec<usize> {
  let len = len as i64;
  let normalize = |i: i64| if i < 0 { i + len } else { i };
  let mut indices = Vec::new();

  if step > 0 {
    let mut i = start.map_or(0, normalize).clamp(0, len);
    let end = end.map_or(len, normalize).clamp(0, len);
    while i < end {
      indices.push(i as usize);
      i += step;
    }
  } else if step < 0 {
    let mut i = start.map_or(len - 1, normalize).clamp(-1, len - 1);
    let end = end.map_or(-1, normalize).clamp(-1, len - 1);
    while i > end {
      indices.push(i as usize);
      i += step;
    }
  }

  indices
}

fn write(node: &mut Value, segments: &[Segment], value: &Value, root: &Value) -> Result<(), String> {
  let Some((segment, rest)) = segments.split_first() else {
    *node = value.clone();
    return Ok(());
  };

  match segment {
    Segment::Child(name) => write_child(node, name, rest, value, root),
    Segment::Index(index) => write_element(node, *index, rest, value, root),
    Segment::Union(selectors) => {
      for selector in selectors {
        match selector {
          Selector::Name(name) => write_child(node, name, rest, value, root)?,
          Selector::Index(index) => write_element(node, *index, rest, value, root)?,
        }
      }
      Ok(())
    }
    Segment::Wildcard => {
      for child in children_mut(node) {
        write(child, rest, value, root)?;
      }
      Ok(())
    }
    Segment::Slice { start, end, step } => {
      if let Value::Array(items) = node {
        for i in slice_indices(items.len(), *start, *end, *step) {
          write(&mut items[i], rest, value, root)?;
        }
      }
      Ok(())
    }
    Segment::Filter(filter) => {
      for child in children_mut(node) {
        if filter.matches(child, root) {
          write(child, rest, value, root)?;
        }
      }
      Ok(())
    }
  }
}

fn write_child(
  node: &mut Value,
  name: &str,
  rest: &[Segment],
  value: &Value,
  root: &Value,
) -> Result<(), String> {
  if node.is_null() {
    *node = Value::Object(Map::new());
  }
  let Value::Object(map) = node else {
    return Err(format!("cannot select member '{}' of {}", name, kind(node)));
  };

  let child = map.entry(name.to_string()).or_insert(Value::Null);
  write(child, rest, value, root)
}

/// Writes may pad an array with at most this many `null`s.
const MAX_WRITE_PADDING: usize = 1024;

fn write_element(
  node: &mut Value,
  index: i64,
  rest: &[Segment],
  value: &Value,
  root: &Value,
) -> Result<(), String> {
  if node.is_null() {
    *node = Value::Array(Vec::new());
  }
  let Value::Array(items) = node else {
    return Err(format!("cannot select index {} of {}", index, kind(node)));
  };

  let position = if index < 0 {
    resolve_index(items.len(), index).ok_or_else(|| format!("index {} is out of range", index))?
  } else {
    let position = usize::try_from(index)
      .ok()
      .filter(|position| position.saturating_sub(items.len()) <= MAX_WRITE_PADDING)
      .ok_or_else(|| format!("index {} is out of range", index))?;
    if items.len() <= position {
      items.resize(position + 1, Value::Null);
    }
    position
  };

  write(&mut items[position], rest, value, root)
}

fn kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "an object",
  }
}

impl Filter {
  fn matches(&self, current: &Value, root: &Value) -> bool {
    match self {
      Filter::Or(left, right) => left.matches(current, root) || right.matches(current, root),
      Filter::And(left, right) => left.matches(current, root) && right.matches(current, root),
      Filter::Exists(Operand::Literal(value)) => value.as_bool().unwrap_or(true),
      Filter::Exists(operand) => operand.resolve(current, root).is_some(),
      Filter::Compare { left, op, right } => {
        match (left.resolve(current, root), right.resolve(current, root)) {
          (Some(left), Some(right)) => compare(left, *op, right),
          _ => false,
        }
      }
    }
  }
}

impl Operand {
  fn resolve<'a>(&'a self, current: &'a Value, root: &'a Value) -> Option<&'a Value> {
    match self {
      Operand::Literal(value) => Some(value),
      Operand::Path { anchor, segments } => {
        let start = match anchor {
          Anchor::Root => root,
          Anchor::Current => current,
        };
        select_all(segments, start, root).into_iter().next()
      }
    }
  }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
  let ordering = match (left, right) {
    (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
      (Some(l), Some(r)) => l.partial_cmp(&r),
      _ => None,
    },
    (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
    _ => (left == right).then_some(Ordering::Equal),
  };

  match op {
    CompareOp::Eq => ordering == Some(Ordering::Equal),
    CompareOp::Ne => ordering != Some(Ordering::Equal),
    CompareOp::Lt => ordering == Some(Ordering::Less),
    CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    CompareOp::Gt => ordering == Some(Ordering::Greater),
    CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
  }
}

struct Parser<'a> {
  source: &'a str,
  offset: usize,
}

impl<'a> Parser<'a> {
  fn new(source: &'a str) -> Self {
    Self { source, offset: 0 }
  }

  fn peek(&self) -> Option<char> {
    self.source[self.offset..].chars().next()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.offset += c.len_utf8();
    Some(c)
  }

  fn eat(&mut self, expected: char) -> bool {
    if self.peek() == Some(expected) {
      self.offset += expected.len_utf8();
      true
    } else {
      false
    }
  }

  fn eat_str(&mut self, expected: &str) -> bool {
    if self.source[self.offset..].starts_with(expected) {
      self.offset += expected.len();
      true
    } else {
      false
    }
  }

  fn expect(&mut self, expected: char) -> Result<(), PathError> {
    if self.eat(expected) {
      Ok(())
    } else {
      Err(self.error(format!("expected '{}'", expected)))
    }
  }

  fn skip_whitespace(&mut self) {
    while self.peek().is_some_and(char::is_whitespace) {
      self.bump();
    }
  }

  fn at_end(&self) -> bool {
    self.offset >= self.source.len()
  }

  fn error(&self, message: impl Into<String>) -> PathError {
    PathError::Parse {
      path: self.source.to_string(),
      offset: self.offset,
      message: message.into(),
    }
  }

  /// Parses an anchor and its segments. Paths nested inside a filter stop
  /// at the first character that cannot continue them.
  fn parse_path(&mut self, nested: bool) -> Result<(Anchor, Vec<Segment>), PathError> {
    let anchor = match self.peek() {
      Some('$') => Anchor::Root,
      Some('@') => Anchor::Current,
      _ => return Err(self.error("path must start with '$' or '@'")),
    };
    self.bump();

    let mut segments = Vec::new();
    loop {
      match self.peek() {
        Some('.') => {
          self.bump();
          segments.push(self.parse_dot_segment(nested)?);
        }
        Some('[') => {
          self.bump();
          segments.push(self.parse_bracket()?);
        }
        None => break,
        Some(_) if nested => break,
        Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
      }
    }

    Ok((anchor, segments))
  }

  fn parse_dot_segment(&mut self, nested: bool) -> Result<Segment, PathError> {
    match self.peek() {
      Some('.') => Err(self.error("recursive descent is not supported")),
      Some('*') => {
        self.bump();
        Ok(Segment::Wildcard)
      }
      _ => {
        let start = self.offset;
        while let Some(c) = self.peek() {
          if c == '.' || c == '[' || (nested && ends_nested_path(c)) {
            break;
          }
          self.bump();
        }
        if start == self.offset {
          return Err(self.error("expected a member name"));
        }
        Ok(Segment::Child(self.source[start..self.offset].to_string()))
      }
    }
  }

  fn parse_bracket(&mut self) -> Result<Segment, PathError> {
    self.skip_whitespace();
    let segment = match self.peek() {
      Some('*') => {
        self.bump();
        Segment::Wildcard
      }
      Some('?') => {
        self.bump();
        self.skip_whitespace();
        self.expect('(')?;
        let filter = self.parse_or()?;
        self.skip_whitespace();
        self.expect(')')?;
        Segment::Filter(filter)
      }
      _ => self.parse_selectors()?,
    };
    self.skip_whitespace();
    self.expect(']')?;
    Ok(segment)
  }

  fn parse_selectors(&mut self) -> Result<Segment, PathError> {
    let first = if matches!(self.peek(), Some('\'' | '"')) {
      Selector::Name(self.parse_quoted()?)
    } else {
      let start = self.parse_int()?;
      self.skip_whitespace();
      if self.eat(':') {
        return self.parse_slice(start);
      }
      Selector::Index(start.ok_or_else(|| self.error("expected an index, name or slice"))?)
    };

    let mut selectors = vec![first];
    loop {
      self.skip_whitespace();
      if !self.eat(',') {
        break;
      }
      self.skip_whitespace();
      let selector = if matches!(self.peek(), Some('\'' | '"')) {
        Selector::Name(self.parse_quoted()?)
      } else {
        Selector::Index(self.parse_int()?.ok_or_else(|| self.error("expected an index"))?)
      };
      selectors.push(selector);
    }

    if selectors.len() == 1 {
      return Ok(match selectors.remove(0) {
        Selector::Name(name) => Segment::Child(name),
        Selector::Index(index) => Segment::Index(index),
      });
    }
    Ok(Segment::Union(selectors))
  }

  fn parse_slice(&mut self, start: Option<i64>) -> Result<Segment, PathError> {
    self.skip_whitespace();
    let end = self.parse_int()?;
    self.skip_whitespace();
    let step = if self.eat(':') {
      self.skip_whitespace();
      self.parse_int()?.unwrap_or(1)
    } else {
      1
    };
    if step == 0 {
      return Err(self.error("slice step must not be zero"));
    }
    Ok(Segment::Slice { start, end, step })
  }

  fn parse_int(&mut self) -> Result<Option<i64>, PathError> {
    let source = self.source;
    let start = self.offset;
    if self.peek() == Some('-') {
      self.bump();
    }
    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
      self.bump();
    }

    let text = &source[start..self.offset];
    if text.is_empty() {
      return Ok(None);
    }
    match text.parse::<i64>() {
      Ok(n) => Ok(Some(n)),
      Err(_) => {
        self.offset = start;
        Err(self.error(format!("invalid integer '{}'", text)))
      }
    }
  }

  fn parse_quoted(&mut self) -> Result<String, PathError> {
    let Some(quote) = self.bump() else {
      return Err(self.error("expected a quoted string"));
    };

    let mut text = String::new();
    loop {
      match self.bump() {
        None => return Err(self.error("unterminated string")),
        Some('\\') => match self.bump() {
          Some(c) => text.push(c),
          None => return Err(self.error("unterminated string")),
        },
        Some(c) if c == quote => return Ok(text),
        Some(c) => text.push(c),
      }
    }
  }

  fn parse_or(&mut self) -> Result<Filter, PathError> {
    let mut left = self.parse_and()?;
    loop {
      self.skip_whitespace();
      if !self.eat_str("||") {
        return Ok(left);
      }
      let right = self.parse_and()?;
      left = Filter::Or(Box::new(left), Box::new(right));
    }
  }

  fn parse_and(&mut self) -> Result<Filter, PathError> {
    let mut left = self.parse_comparison()?;
    loop {
      self.skip_whitespace();
      if !self.eat_str("&&") {
        return Ok(left);
      }
      let right = self.parse_comparison()?;
      left = Filter::And(Box::new(left), Box::new(right));
    }
  }

  fn parse_comparison(&mut self) -> Result<Filter, PathError> {
    self.skip_whitespace();
    if self.eat('(') {
      let inner = self.parse_or()?;
      self.skip_whitespace();
      self.expect(')')?;
      return Ok(inner);
    }

    let left = self.parse_operand()?;
    self.skip_whitespace();
    let op = if self.eat_str("==") {
      CompareOp::Eq
    } else if self.eat_str("!=") {
      CompareOp::Ne
    } else if self.eat_str("<=") {
      CompareOp::Le
    } else if self.eat_str(">=") {
      CompareOp::Ge
    } else if self.eat('<') {
      CompareOp::Lt
    } else if self.eat('>') {
      CompareOp::Gt
    } else {
      return Ok(Filter::Exists(left));
    };

    self.skip_whitespace();
    let right = self.parse_operand()?;
    Ok(Filter::Compare { left, op, right })
  }

  fn parse_operand(&mut self) -> Result<Operand, PathError> {
    match self.peek() {
      Some('@' | '$') => {
        let (anchor, segments) = self.parse_path(true)?;
        Ok(Operand::Path { anchor, segments })
      }
      Some('\'' | '"') => Ok(Operand::Literal(Value::String(self.parse_quoted()?))),
      _ => {
        let source = self.source;
        let start = self.offset;
        while self
          .peek()
          .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.'))
        {
          self.bump();
        }

        let literal = match &source[start..self.offset] {
          "true" => Value::Bool(true),
          "false" => Value::Bool(false),
          "null" => Value::Null,
          word => match word.parse::<Number>() {
            Ok(n) => Value::Number(n),
            Err(_) => {
              self.offset = start;
              return Err(self.error("expected a path or literal"));
            }
          },
        };
        Ok(Operand::Literal(literal))
      }
    }
  }
}

fn ends_nested_path(c: char) -> bool {
  c.is_whitespace() || matches!(c, '=' | '!' | '<' | '>' | '&' | '|' | ')' | ']' | ',')
}
