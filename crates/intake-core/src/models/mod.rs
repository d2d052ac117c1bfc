//! Data models for the intake pipeline
//!
//! Upload records and progress state, content hashes, and workflow statuses.

mod hash;
mod upload;
mod workflow;

pub use hash::*;
pub use upload::*;
pub use workflow::*;
