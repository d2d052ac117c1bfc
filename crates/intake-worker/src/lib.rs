//! Workflow orchestration for the intake pipeline
//!
//! Workflows are resolved once at startup into immutable definitions held by a
//! [`WorkflowRegistry`]. The [`Orchestrator`] binds a definition to an upload
//! request and runs its steps in order, persisting every transition so status
//! can be answered from the database alone.

pub mod definition;
pub mod handler;
pub mod orchestrator;

pub use definition::{StepDefinition, WorkflowDefinition, WorkflowDefinitionBuilder, WorkflowRegistry};
pub use handler::StepHandler;
pub use orchestrator::{Orchestrator, WorkflowRun, INTERRUPTED_REASON};
