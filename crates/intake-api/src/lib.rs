//! Intake API Library
//!
//! This crate provides the HTTP handlers and application setup for the
//! upload ingestion service.

pub mod constants;
pub mod error;
mod handlers;
pub mod setup;
pub mod state;
pub mod telemetry;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
