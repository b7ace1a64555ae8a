//! Typed states.
//!
//! Each state type is its own record. The data-flow fields a type supports
//! are grouped into capability structs ([`DataPaths`], [`ResultHandling`],
//! [`Recovery`]) that the variants embed as needed:
//!
//! | Type     | DataPaths | ResultHandling | Recovery |
//! |----------|-----------|----------------|----------|
//! | Pass     | yes       | yes            |          |
//! | Task     | yes       | yes            | yes      |
//! | Choice   | yes       |                |          |
//! | Wait     | yes       |                |          |
//! | Succeed  | yes       |                |          |
//! | Fail     |           |                |          |
//! | Parallel | yes       | yes            | yes      |
//! | Map      | yes       | yes            | yes      |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_path::{Path, ReferencePath};

use crate::condition::Condition;
use crate::retry::{Catcher, Retrier};
use crate::timestamp::Timestamp;
use crate::workflow::Workflow;

/// Where a state goes once it completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transition {
  Next(String),
  End,
}

/// A data-flow path field that may also be set to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathSpec<P> {
  Path(P),
  /// The field was `null`.
  Discard,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPaths {
  pub input_path: Option<PathSpec<Path>>,
  pub output_path: Option<PathSpec<Path>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultHandling {
  pub result_path: Option<PathSpec<ReferencePath>>,
  pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recovery {
  pub result_selector: Option<Value>,
  pub retry: Vec<Retrier>,
  pub catch: Vec<Catcher>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
  Pass,
  Task,
  Choice,
  Wait,
  Succeed,
  Fail,
  Parallel,
  Map,
}

impl StateKind {
  pub fn from_name(name: &str) -> Option<Self> {
    Some(match name {
      "Pass" => StateKind::Pass,
      "Task" => StateKind::Task,
      "Choice" => StateKind::Choice,
      "Wait" => StateKind::Wait,
      "Succeed" => StateKind::Succeed,
      "Fail" => StateKind::Fail,
      "Parallel" => StateKind::Parallel,
      "Map" => StateKind::Map,
      _ => return None,
    })
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      StateKind::Pass => "Pass",
      StateKind::Task => "Task",
      StateKind::Choice => "Choice",
      StateKind::Wait => "Wait",
      StateKind::Succeed => "Succeed",
      StateKind::Fail => "Fail",
      StateKind::Parallel => "Parallel",
      StateKind::Map => "Map",
    }
  }
}

impl fmt::Display for StateKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A task resource of the form `type:path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResource {
  #[serde(rename = "Type")]
  pub resource_type: String,
  #[serde(rename = "Path")]
  pub path: String,
}

impl TaskResource {
  /// Splits on `:`. Exactly two non-empty segments are required.
  pub fn parse(resource: &str) -> Option<Self> {
    let mut parts = resource.split(':');
    match (parts.next(), parts.next(), parts.next()) {
      (Some(resource_type), Some(path), None) if !resource_type.is_empty() && !path.is_empty() => {
        Some(Self {
          resource_type: resource_type.to_string(),
          path: path.to_string(),
        })
      }
      _ => None,
    }
  }
}

impl fmt::Display for TaskResource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.resource_type, self.path)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
  pub handling: ResultHandling,
  pub result: Option<Value>,
  pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
  pub handling: ResultHandling,
  pub recovery: Recovery,
  pub resource: TaskResource,
  /// Bound on one invocation. Zero means unbounded.
  pub timeout_seconds: u64,
  pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceRule {
  pub condition: Condition,
  pub next: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
  pub choices: Vec<ChoiceRule>,
  pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WaitDuration {
  Seconds(u64),
  Timestamp(Timestamp),
  SecondsPath(ReferencePath),
  TimestampPath(ReferencePath),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
  pub duration: WaitDuration,
  pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SucceedState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailState {
  pub name: String,
  pub comment: Option<String>,
  pub error: Option<String>,
  pub cause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
  pub handling: ResultHandling,
  pub recovery: Recovery,
  pub branches: Vec<Arc<Workflow>>,
  pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapState {
  pub name: String,
  pub comment: Option<String>,
  pub paths: DataPaths,
  pub handling: ResultHandling,
  pub recovery: Recovery,
  pub iterator: Arc<Workflow>,
  pub items_path: ReferencePath,
  /// Zero means unbounded.
  pub max_concurrency: usize,
  pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum State {
  Pass(PassState),
  Task(TaskState),
  Choice(ChoiceState),
  Wait(WaitState),
  Succeed(SucceedState),
  Fail(FailState),
  Parallel(ParallelState),
  Map(MapState),
}

impl State {
  pub fn name(&self) -> &str {
    match self {
      State::Pass(s) => &s.name,
      State::Task(s) => &s.name,
      State::Choice(s) => &s.name,
      State::Wait(s) => &s.name,
      State::Succeed(s) => &s.name,
      State::Fail(s) => &s.name,
      State::Parallel(s) => &s.name,
      State::Map(s) => &s.name,
    }
  }

  pub fn kind(&self) -> StateKind {
    match self {
      State::Pass(_) => StateKind::Pass,
      State::Task(_) => StateKind::Task,
      State::Choice(_) => StateKind::Choice,
      State::Wait(_) => StateKind::Wait,
      State::Succeed(_) => StateKind::Succeed,
      State::Fail(_) => StateKind::Fail,
      State::Parallel(_) => StateKind::Parallel,
      State::Map(_) => StateKind::Map,
    }
  }

  pub fn comment(&self) -> Option<&str> {
    match self {
      State::Pass(s) => s.comment.as_deref(),
      State::Task(s) => s.comment.as_deref(),
      State::Choice(s) => s.comment.as_deref(),
      State::Wait(s) => s.comment.as_deref(),
      State::Succeed(s) => s.comment.as_deref(),
      State::Fail(s) => s.comment.as_deref(),
      State::Parallel(s) => s.comment.as_deref(),
      State::Map(s) => s.comment.as_deref(),
    }
  }

  /// InputPath/OutputPath, for every type except Fail.
  pub fn paths(&self) -> Option<&DataPaths> {
    match self {
      State::Pass(s) => Some(&s.paths),
      State::Task(s) => Some(&s.paths),
      State::Choice(s) => Some(&s.paths),
      State::Wait(s) => Some(&s.paths),
      State::Succeed(s) => Some(&s.paths),
      State::Parallel(s) => Some(&s.paths),
      State::Map(s) => Some(&s.paths),
      State::Fail(_) => None,
    }
  }

  pub fn result_handling(&self) -> Option<&ResultHandling> {
    match self {
      State::Pass(s) => Some(&s.handling),
      State::Task(s) => Some(&s.handling),
      State::Parallel(s) => Some(&s.handling),
      State::Map(s) => Some(&s.handling),
      _ => None,
    }
  }

  pub fn recovery(&self) -> Option<&Recovery> {
    match self {
      State::Task(s) => Some(&s.recovery),
      State::Parallel(s) => Some(&s.recovery),
      State::Map(s) => Some(&s.recovery),
      _ => None,
    }
  }

  /// `None` for Choice, Succeed and Fail.
  pub fn transition(&self) -> Option<&Transition> {
    match self {
      State::Pass(s) => Some(&s.transition),
      State::Task(s) => Some(&s.transition),
      State::Wait(s) => Some(&s.transition),
      State::Parallel(s) => Some(&s.transition),
      State::Map(s) => Some(&s.transition),
      State::Choice(_) | State::Succeed(_) | State::Fail(_) => None,
    }
  }

  /// The state's `Next`, if any.
  pub fn next(&self) -> Option<&str> {
    match self.transition() {
      Some(Transition::Next(next)) => Some(next),
      _ => None,
    }
  }

  /// States reachable other than through `Next`: choice targets, the
  /// choice default, and catcher targets. Duplicates are removed.
  pub fn branch_targets(&self) -> Vec<&str> {
    let mut targets: Vec<&str> = Vec::new();
    if let State::Choice(choice) = self {
      targets.extend(choice.choices.iter().map(|rule| rule.next.as_str()));
      targets.extend(choice.default.as_deref());
    }
    if let Some(recovery) = self.recovery() {
      targets.extend(recovery.catch.iter().map(|catcher| catcher.next.as_str()));
    }

    let mut seen = Vec::with_capacity(targets.len());
    targets.retain(|target| {
      if seen.contains(target) {
        false
      } else {
        seen.push(*target);
        true
      }
    });
    targets
  }

  /// Every state this one can transition to.
  pub fn successors(&self) -> Vec<&str> {
    let mut all: Vec<&str> = self.next().into_iter().collect();
    for target in self.branch_targets() {
      if !all.contains(&target) {
        all.push(target);
      }
    }
    all
  }
}
