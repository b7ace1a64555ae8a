//! Waypoint paths.
//!
//! JSONPath parsing and evaluation, the `Path`/`ReferencePath` types used
//! by workflow data-flow fields, and the context object that `$$` paths
//! read from.

mod context;
mod error;
mod expr;
mod path;
mod resolve;

pub use context::ContextObject;
pub use error::PathError;
pub use expr::{Anchor, CompareOp, Filter, JsonPath, Operand, Segment, Selector};
pub use path::{CONTEXT_PREFIX, Path, ReferencePath};
pub use resolve::{join, unjoin};
