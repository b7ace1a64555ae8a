//! Intrinsic function registry.
//!
//! The registry is built once at startup and only read afterwards, so a
//! single instance can be shared behind an `Arc` by every execution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use waypoint_path::{ContextObject, unjoin};

use crate::error::IntrinsicError;
use crate::parse::{Argument, IntrinsicCall, parse};
use crate::states;

/// Signature shared by all intrinsic functions.
pub type IntrinsicFn = Arc<dyn Fn(&[Value]) -> Result<Value, IntrinsicError> + Send + Sync>;

/// Name to function table used when evaluating payload templates.
#[derive(Clone, Default)]
pub struct IntrinsicRegistry {
  functions: HashMap<String, IntrinsicFn>,
}

impl IntrinsicRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry holding the built-in `States.*` functions.
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry.register("States.Format", states::format);
    registry.register("States.StringToJson", states::string_to_json);
    registry.register("States.JsonToString", states::json_to_string);
    registry.register("States.Array", states::array);
    registry.register("States.ArrayLength", states::array_length);
    registry.register("States.ArrayContains", states::array_contains);
    registry.register("States.MathAdd", states::math_add);
    registry.register("States.StringSplit", states::string_split);
    registry.register("States.UUID", states::uuid);
    registry
  }

  /// Register `function` under `name`, replacing any previous entry.
  pub fn register<F>(&mut self, name: impl Into<String>, function: F)
  where
    F: Fn(&[Value]) -> Result<Value, IntrinsicError> + Send + Sync + 'static,
  {
    self.functions.insert(name.into(), Arc::new(function));
  }

  pub fn contains(&self, name: &str) -> bool {
    self.functions.contains_key(name)
  }

  /// Invoke a function with already-resolved arguments.
  pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, IntrinsicError> {
    let function = self
      .functions
      .get(name)
      .ok_or_else(|| IntrinsicError::UnknownFunction {
        name: name.to_string(),
      })?;
    function(args)
  }

  /// Evaluate a parsed call, resolving path arguments against `input`
  /// (or `context` for `$$` paths) and nested calls recursively.
  pub fn evaluate(
    &self,
    call: &IntrinsicCall,
    context: &ContextObject,
    input: &Value,
  ) -> Result<Value, IntrinsicError> {
    let args = call
      .args
      .iter()
      .map(|arg| match arg {
        Argument::Literal(value) => Ok(value.clone()),
        Argument::Path(path) => Ok(unjoin(context, input, path)?),
        Argument::Call(inner) => self.evaluate(inner, context, input),
      })
      .collect::<Result<Vec<_>, IntrinsicError>>()?;

    self.call(&call.name, &args)
  }

  /// Parse and evaluate `expr` in one step.
  pub fn evaluate_str(
    &self,
    expr: &str,
    context: &ContextObject,
    input: &Value,
  ) -> Result<Value, IntrinsicError> {
    self.evaluate(&parse(expr)?, context, input)
  }
}

impl fmt::Debug for IntrinsicRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<_> = self.functions.keys().collect();
    names.sort();
    f.debug_struct("IntrinsicRegistry")
      .field("functions", &names)
      .finish()
  }
}
