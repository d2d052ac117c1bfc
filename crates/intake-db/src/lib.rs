//! Intake persistence
//!
//! Durable upload requests and workflow execution state on SQLite, with
//! embedded migrations.

pub mod db;

pub use db::{
    connect, run_migrations, NewStep, UploadRequestRepository, UploadRequestStore,
    WorkflowExecutionRepository, WorkflowStateStore,
};
