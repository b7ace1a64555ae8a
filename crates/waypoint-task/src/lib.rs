//! Waypoint Task
//!
//! Task states name a resource such as `script:/usr/local/bin/resize`. The
//! part before the colon picks a [`TaskExecutor`] from the
//! [`TaskRegistry`]; the part after it is handed to that executor along
//! with the task input.

mod error;
mod executor;
mod registry;
mod script;

pub use error::TaskError;
pub use executor::TaskExecutor;
pub use registry::TaskRegistry;
pub use script::{SCRIPT_RESOURCE_TYPE, ScriptTask};
