//! Waypoint ASL
//!
//! The workflow document model and its compiler. A document is a JSON
//! state machine in the style of the Amazon States Language; compiling it
//! yields a [`Workflow`], a validated graph of typed [`State`]s that the
//! engine walks at run time.
//!
//! Compilation rejects:
//! - missing `StartAt`/`States`, or a `StartAt` that names no state
//! - unknown state types and malformed type-specific fields
//! - task resources that are not `type:path`
//! - malformed choice rules
//! - transitions to undeclared states, and states with both or neither of
//!   `Next` and `End`

mod compiler;
mod condition;
mod document;
mod error;
mod names;
mod retry;
mod state;
mod timestamp;
mod workflow;

pub use compiler::{compile_reader, compile_str, compile_value};
pub use condition::{Comparison, Condition, ConditionError, Operand, TypeTest, ValueKind};
pub use error::CompileError;
pub use names::{ErrorName, STATES_ALL};
pub use retry::{Catcher, Retrier};
pub use state::{
  ChoiceRule, ChoiceState, DataPaths, FailState, MapState, ParallelState, PassState, PathSpec,
  Recovery, ResultHandling, State, StateKind, SucceedState, TaskResource, TaskState, Transition,
  WaitDuration, WaitState,
};
pub use timestamp::{TIMESTAMP_FORMAT, Timestamp};
pub use workflow::Workflow;
