//! Workflow models for the ingestion pipeline

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// What happens to the pipeline when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureBehavior {
    /// Stop the pipeline; remaining steps are never run
    AbortPipeline,
    /// Record the failure and continue with the next step
    ToleratePipeline,
}

impl FailureBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureBehavior::AbortPipeline => "abort_pipeline",
            FailureBehavior::ToleratePipeline => "tolerate_pipeline",
        }
    }
}

impl FromStr for FailureBehavior {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abort_pipeline" => Ok(FailureBehavior::AbortPipeline),
            "tolerate_pipeline" => Ok(FailureBehavior::ToleratePipeline),
            other => Err(AppError::Internal(format!(
                "Unknown failure behavior: {}",
                other
            ))),
        }
    }
}

/// Status of a single step within a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Failed)
    }

    /// Legal transitions: Pending → Running → Succeeded | Failed
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Succeeded)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }
}

impl FromStr for StepStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "succeeded" => Ok(StepStatus::Succeeded),
            "failed" => Ok(StepStatus::Failed),
            other => Err(AppError::Internal(format!("Unknown step status: {}", other))),
        }
    }
}

impl Display for StepStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Aggregate status of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "pending",
            PipelineStatus::Running => "running",
            PipelineStatus::Succeeded => "succeeded",
            PipelineStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Succeeded | PipelineStatus::Failed)
    }
}

impl FromStr for PipelineStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PipelineStatus::Pending),
            "running" => Ok(PipelineStatus::Running),
            "succeeded" => Ok(PipelineStatus::Succeeded),
            "failed" => Ok(PipelineStatus::Failed),
            other => Err(AppError::Internal(format!(
                "Unknown pipeline status: {}",
                other
            ))),
        }
    }
}

impl Display for PipelineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one step of a workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub position: u32,
    pub name: String,
    pub failure_behavior: FailureBehavior,
    pub status: StepStatus,
    /// Human-readable status reported by the handler after success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status of a workflow execution as read back from persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStatus {
    pub request_id: Uuid,
    pub workflow: String,
    pub overall: PipelineStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
}

impl WorkflowStatus {
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// Derive the pipeline status from its steps.
///
/// Any failed `AbortPipeline` step fails the pipeline. Otherwise the pipeline
/// succeeds once every step is resolved; until then it is running if any step
/// has started, pending if none has.
pub fn derive_pipeline_status(steps: &[StepRecord]) -> PipelineStatus {
    if steps.iter().any(|s| {
        s.status == StepStatus::Failed && s.failure_behavior == FailureBehavior::AbortPipeline
    }) {
        return PipelineStatus::Failed;
    }
    if !steps.is_empty() && steps.iter().all(|s| s.status.is_resolved()) {
        return PipelineStatus::Succeeded;
    }
    if steps.iter().any(|s| s.status != StepStatus::Pending) {
        return PipelineStatus::Running;
    }
    PipelineStatus::Pending
}
