//! Intrinsic functions for waypoint payload templates.
//!
//! Template values such as `States.Format('{} items', $.count)` are parsed
//! into an [`IntrinsicCall`] and evaluated against an [`IntrinsicRegistry`].

mod error;
mod parse;
mod registry;
pub mod states;

pub use error::IntrinsicError;
pub use parse::{Argument, IntrinsicCall, is_call, parse};
pub use registry::{IntrinsicFn, IntrinsicRegistry};
