//! Waypoint Engine
//!
//! Executes compiled workflows. The [`Runtime`] walks a
//! [`waypoint_asl::Workflow`] state by state, applying the data-flow
//! filters around each state, dispatching Task states through the
//! [`waypoint_task::TaskRegistry`], and running Parallel branches and Map
//! iterations concurrently.
//!
//! Execution progress is reported through an [`ExecutionNotifier`].
//! Cancellation is cooperative via `CancellationToken`.

mod config;
mod context;
mod error;
mod events;
mod fanout;
mod filter;
mod payload;
mod result;
mod runtime;
mod states;

pub use config::RuntimeConfig;
pub use error::{ExecutionError, StatesError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use result::{ExecutionResult, ExecutionStatus};
pub use runtime::Runtime;
