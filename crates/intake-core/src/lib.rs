//! Intake Core Library
//!
//! This crate provides the domain models, error types and configuration
//! shared across all intake components.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{IntakeConfig, LogFormat, ScanConfig};
pub use error::{AppError, AppResult, ErrorMetadata, LogLevel, CANCELLED_REASON};
pub use storage_types::StorageBackend;
// Note: ObjectStorage, StorageError and the staging/permanent stores live in
// intake-storage; import them from there.
