//! Database repositories for data access layer
//!
//! Each repository is responsible for one table family and implements the
//! store trait the pipeline depends on, so callers can swap in test doubles.

pub mod pool;
pub mod upload_request;
pub mod workflow;

pub use pool::{connect, run_migrations};
pub use upload_request::{UploadRequestRepository, UploadRequestStore};
pub use workflow::{NewStep, WorkflowExecutionRepository, WorkflowStateStore};
