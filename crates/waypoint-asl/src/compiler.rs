//! Document to [`Workflow`] compilation.
//!
//! 1. Top-level fields are read and defaulted (`Version` "1.0",
//!    `TimeoutSeconds` 0).
//! 2. Each state's `Type` is read first, then its type-specific fields.
//!    Parallel branches and Map iterators compile recursively.
//! 3. Transitions are checked against the declared states.
//! 4. States are partitioned into branches, breadth-first from `StartAt`.

use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::sync::Arc;

use serde_json::{Map, Value};
use waypoint_path::{Path, PathError, ReferencePath};

use crate::condition;
use crate::document::{RawCatcher, RawDocument, RawState};
use crate::error::CompileError;
use crate::retry::{Catcher, Retrier, validate_all_is_last, validate_error_equals};
use crate::state::{
  ChoiceRule, ChoiceState, DataPaths, FailState, MapState, ParallelState, PassState, PathSpec,
  Recovery, ResultHandling, State, StateKind, SucceedState, TaskResource, TaskState, Transition,
  WaitDuration, WaitState,
};
use crate::timestamp::Timestamp;
use crate::workflow::{StatePosition, Workflow};

const DEFAULT_VERSION: &str = "1.0";

pub fn compile_str(text: &str) -> Result<Workflow, CompileError> {
  compile_value(serde_json::from_str(text)?)
}

pub fn compile_reader<R: Read>(reader: R) -> Result<Workflow, CompileError> {
  compile_value(serde_json::from_reader(reader)?)
}

pub fn compile_value(document: Value) -> Result<Workflow, CompileError> {
  let raw: RawDocument = serde_json::from_value(document)?;

  let start_at = raw.start_at.ok_or(CompileError::MissingStartAt)?;
  let declared = raw.states.ok_or(CompileError::MissingStates)?;

  let mut states = HashMap::with_capacity(declared.len());
  for (name, value) in declared {
    let state = decode_state(&name, value)?;
    states.insert(name, state);
  }

  if !states.contains_key(&start_at) {
    return Err(CompileError::StartAtNotFound { name: start_at });
  }
  for state in states.values() {
    for target in state.successors() {
      if !states.contains_key(target) {
        return Err(CompileError::UnknownTransition {
          state: state.name().to_string(),
          target: target.to_string(),
        });
      }
    }
  }

  let (branches, index) = partition(&start_at, states);

  Ok(Workflow::new(
    raw.comment,
    start_at,
    raw.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    raw.timeout_seconds.unwrap_or(0),
    branches,
    index,
  ))
}

/// Splits states into branches by following `Next` links.
///
/// A branch ends at a state without `Next` or when `Next` names a state
/// some branch already holds. Choice and catch targets seen along the way
/// become entry points of later branches, handled in discovery order.
/// States no entry point reaches are dropped.
fn partition(
  start_at: &str,
  mut states: HashMap<String, State>,
) -> (Vec<Vec<State>>, HashMap<String, StatePosition>) {
  let mut branches: Vec<Vec<State>> = Vec::new();
  let mut index: HashMap<String, StatePosition> = HashMap::new();
  let mut entries: VecDeque<String> = VecDeque::from([start_at.to_string()]);

  while let Some(entry) = entries.pop_front() {
    if index.contains_key(&entry) {
      continue;
    }

    let mut branch = Vec::new();
    let mut current = Some(entry);
    while let Some(name) = current.take() {
      if index.contains_key(&name) {
        break;
      }
      let Some(state) = states.remove(&name) else {
        break;
      };

      index.insert(
        name,
        StatePosition {
          branch: branches.len(),
          offset: branch.len(),
        },
      );
      for target in state.branch_targets() {
        if !index.contains_key(target) {
          entries.push_back(target.to_string());
        }
      }
      current = state.next().map(str::to_string);
      branch.push(state);
    }
    branches.push(branch);
  }

  (branches, index)
}

fn decode_state(name: &str, value: Value) -> Result<State, CompileError> {
  let kind = match value.get("Type") {
    Some(Value::String(type_name)) => {
      StateKind::from_name(type_name).ok_or_else(|| CompileError::UnknownStateType {
        state: name.to_string(),
        type_name: type_name.clone(),
      })?
    }
    Some(_) => {
      return Err(CompileError::InvalidState {
        state: name.to_string(),
        message: "Type must be a string".to_string(),
      });
    }
    None => {
      return Err(CompileError::MissingType {
        state: name.to_string(),
      });
    }
  };

  let raw: RawState = serde_json::from_value(value).map_err(|e| CompileError::InvalidState {
    state: name.to_string(),
    message: e.to_string(),
  })?;
  let mut decoder = StateDecoder { name, raw };

  let state = match kind {
    StateKind::Pass => State::Pass(PassState {
      name: name.to_string(),
      paths: decoder.paths()?,
      handling: decoder.handling()?,
      result: decoder.raw.result.take(),
      transition: decoder.transition()?,
      comment: decoder.raw.comment.take(),
    }),
    StateKind::Task => {
      let resource = decoder.raw.resource.take().ok_or_else(|| decoder.invalid("Resource is required"))?;
      let resource = TaskResource::parse(&resource).ok_or_else(|| CompileError::InvalidTaskResource {
        state: name.to_string(),
        resource,
      })?;
      State::Task(TaskState {
        name: name.to_string(),
        paths: decoder.paths()?,
        handling: decoder.handling()?,
        recovery: decoder.recovery()?,
        resource,
        timeout_seconds: decoder.raw.timeout_seconds.unwrap_or(0),
        transition: decoder.transition()?,
        comment: decoder.raw.comment.take(),
      })
    }
    StateKind::Choice => State::Choice(ChoiceState {
      name: name.to_string(),
      paths: decoder.paths()?,
      choices: decoder.choices()?,
      default: decoder.raw.default.take(),
      comment: decoder.raw.comment.take(),
    }),
    StateKind::Wait => State::Wait(WaitState {
      name: name.to_string(),
      paths: decoder.paths()?,
      duration: decoder.wait_duration()?,
      transition: decoder.transition()?,
      comment: decoder.raw.comment.take(),
    }),
    StateKind::Succeed => State::Succeed(SucceedState {
      name: name.to_string(),
      paths: decoder.paths()?,
      comment: decoder.raw.comment.take(),
    }),
    StateKind::Fail => State::Fail(FailState {
      name: name.to_string(),
      error: decoder.raw.error.take(),
      cause: decoder.raw.cause.take(),
      comment: decoder.raw.comment.take(),
    }),
    StateKind::Parallel => {
      let raw_branches = decoder.raw.branches.take().ok_or_else(|| decoder.invalid("Branches is required"))?;
      if raw_branches.is_empty() {
        return Err(decoder.invalid("Branches must not be empty"));
      }
      let branches = raw_branches
        .into_iter()
        .map(|branch| decoder.sub_workflow(branch))
        .collect::<Result<Vec<_>, _>>()?;
      State::Parallel(ParallelState {
        name: name.to_string(),
        paths: decoder.paths()?,
        handling: decoder.handling()?,
        recovery: decoder.recovery()?,
        branches,
        transition: decoder.transition()?,
        comment: decoder.raw.comment.take(),
      })
    }
    StateKind::Map => {
      let iterator = decoder.raw.iterator.take().ok_or_else(|| decoder.invalid("Iterator is required"))?;
      let items_path = match decoder.raw.items_path.take() {
        Some(text) => decoder.reference_path("ItemsPath", &text)?,
        None => ReferencePath::root(),
      };
      State::Map(MapState {
        name: name.to_string(),
        iterator: decoder.sub_workflow(iterator)?,
        items_path,
        max_concurrency: decoder.raw.max_concurrency.unwrap_or(0),
        paths: decoder.paths()?,
        handling: decoder.handling()?,
        recovery: decoder.recovery()?,
        transition: decoder.transition()?,
        comment: decoder.raw.comment.take(),
      })
    }
  };

  Ok(state)
}

struct StateDecoder<'a> {
  name: &'a str,
  raw: RawState,
}

impl StateDecoder<'_> {
  fn invalid(&self, message: impl Into<String>) -> CompileError {
    CompileError::InvalidState {
      state: self.name.to_string(),
      message: message.into(),
    }
  }

  fn path_error(&self, field: &'static str, source: PathError) -> CompileError {
    CompileError::InvalidPath {
      state: self.name.to_string(),
      field,
      source,
    }
  }

  fn path(&self, field: &'static str, text: &str) -> Result<Path, CompileError> {
    Path::parse(text).map_err(|e| self.path_error(field, e))
  }

  fn reference_path(&self, field: &'static str, text: &str) -> Result<ReferencePath, CompileError> {
    ReferencePath::parse(text).map_err(|e| self.path_error(field, e))
  }

  fn path_spec(&self, field: &'static str, raw: Option<Option<String>>) -> Result<Option<PathSpec<Path>>, CompileError> {
    Ok(match raw {
      None => None,
      Some(None) => Some(PathSpec::Discard),
      Some(Some(text)) => Some(PathSpec::Path(self.path(field, &text)?)),
    })
  }

  fn reference_spec(
    &self,
    field: &'static str,
    raw: Option<Option<String>>,
  ) -> Result<Option<PathSpec<ReferencePath>>, CompileError> {
    Ok(match raw {
      None => None,
      Some(None) => Some(PathSpec::Discard),
      Some(Some(text)) => Some(PathSpec::Path(self.reference_path(field, &text)?)),
    })
  }

  fn paths(&mut self) -> Result<DataPaths, CompileError> {
    let input_path = self.raw.input_path.take();
    let output_path = self.raw.output_path.take();
    Ok(DataPaths {
      input_path: self.path_spec("InputPath", input_path)?,
      output_path: self.path_spec("OutputPath", output_path)?,
    })
  }

  fn handling(&mut self) -> Result<ResultHandling, CompileError> {
    let result_path = self.raw.result_path.take();
    let parameters = self.raw.parameters.take();
    if parameters.as_ref().is_some_and(|p| !p.is_object()) {
      return Err(self.invalid("Parameters must be an object"));
    }
    Ok(ResultHandling {
      result_path: self.reference_spec("ResultPath", result_path)?,
      parameters,
    })
  }

  fn recovery(&mut self) -> Result<Recovery, CompileError> {
    let result_selector = self.raw.result_selector.take();
    if result_selector.as_ref().is_some_and(|p| !p.is_object()) {
      return Err(self.invalid("ResultSelector must be an object"));
    }

    let invalid_retrier = |message: String| CompileError::InvalidRetrier {
      state: self.name.to_string(),
      message,
    };
    let mut retry = Vec::new();
    for value in self.raw.retry.take().unwrap_or_default() {
      let retrier: Retrier = serde_json::from_value(value).map_err(|e| invalid_retrier(e.to_string()))?;
      retrier.validate().map_err(invalid_retrier)?;
      retry.push(retrier);
    }
    validate_all_is_last(retry.iter().map(|r| r.error_equals.as_slice())).map_err(invalid_retrier)?;

    let invalid_catcher = |message: String| CompileError::InvalidCatcher {
      state: self.name.to_string(),
      message,
    };
    let mut catch = Vec::new();
    for RawCatcher {
      error_equals,
      next,
      result_path,
    } in self.raw.catch.take().unwrap_or_default()
    {
      validate_error_equals(&error_equals).map_err(invalid_catcher)?;
      catch.push(Catcher {
        error_equals,
        next,
        result_path: self.reference_spec("Catch.ResultPath", result_path)?,
      });
    }
    validate_all_is_last(catch.iter().map(|c| c.error_equals.as_slice())).map_err(invalid_catcher)?;

    Ok(Recovery {
      result_selector,
      retry,
      catch,
    })
  }

  fn transition(&mut self) -> Result<Transition, CompileError> {
    let end = self.raw.end.unwrap_or(false);
    match (self.raw.next.take(), end) {
      (Some(_), true) => Err(CompileError::AmbiguousTransition {
        state: self.name.to_string(),
      }),
      (Some(next), false) => Ok(Transition::Next(next)),
      (None, true) => Ok(Transition::End),
      (None, false) => Err(CompileError::MissingTransition {
        state: self.name.to_string(),
      }),
    }
  }

  fn choices(&mut self) -> Result<Vec<ChoiceRule>, CompileError> {
    let raw = self.raw.choices.take().ok_or_else(|| self.invalid("Choices is required"))?;
    if raw.is_empty() {
      return Err(self.invalid("Choices must not be empty"));
    }

    raw
      .iter()
      .enumerate()
      .map(|(index, rule)| {
        let malformed = |message: String| CompileError::InvalidChoiceRule {
          state: self.name.to_string(),
          index,
          message,
        };
        let rule: &Map<String, Value> = rule
          .as_object()
          .ok_or_else(|| malformed("rule must be an object".to_string()))?;
        let next = match rule.get("Next") {
          Some(Value::String(next)) => next.clone(),
          _ => return Err(malformed("rule must have a string Next".to_string())),
        };
        let condition = condition::decode(rule).map_err(malformed)?;
        Ok(ChoiceRule { condition, next })
      })
      .collect()
  }

  fn wait_duration(&mut self) -> Result<WaitDuration, CompileError> {
    let sources = [
      self.raw.seconds.is_some(),
      self.raw.timestamp.is_some(),
      self.raw.seconds_path.is_some(),
      self.raw.timestamp_path.is_some(),
    ];
    match sources.iter().filter(|set| **set).count() {
      0 => {
        return Err(self.invalid(
          "one of Seconds, Timestamp, SecondsPath or TimestampPath is required",
        ));
      }
      1 => {}
      _ => {
        return Err(self.invalid(
          "only one of Seconds, Timestamp, SecondsPath or TimestampPath may be set",
        ));
      }
    }

    if let Some(seconds) = self.raw.seconds {
      return Ok(WaitDuration::Seconds(seconds));
    }
    if let Some(text) = self.raw.timestamp.take() {
      let timestamp = Timestamp::parse(&text).map_err(|e| self.invalid(format!("Timestamp '{}': {}", text, e)))?;
      return Ok(WaitDuration::Timestamp(timestamp));
    }
    if let Some(text) = self.raw.seconds_path.take() {
      return Ok(WaitDuration::SecondsPath(self.reference_path("SecondsPath", &text)?));
    }
    let text = self.raw.timestamp_path.take().unwrap_or_default();
    Ok(WaitDuration::TimestampPath(self.reference_path("TimestampPath", &text)?))
  }

  fn sub_workflow(&self, document: Value) -> Result<Arc<Workflow>, CompileError> {
    compile_value(document)
      .map(Arc::new)
      .map_err(|source| CompileError::InvalidBranch {
        state: self.name.to_string(),
        source: Box::new(source),
      })
  }
}
