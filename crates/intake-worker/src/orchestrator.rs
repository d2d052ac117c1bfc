//! Workflow orchestrator: step sequencing, failure policy and status queries.
//!
//! Every step transition is persisted before the orchestrator moves on, so the
//! status of an execution can always be rebuilt from the database after a restart.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use intake_core::models::{
    derive_pipeline_status, FailureBehavior, PipelineStatus, StepStatus, UploadRecord,
    WorkflowStatus,
};
use intake_core::{AppError, AppResult, CANCELLED_REASON};
use intake_db::{NewStep, WorkflowStateStore};

use crate::definition::{StepDefinition, WorkflowDefinition, WorkflowRegistry};

/// Error recorded on steps that were still open when the process stopped
pub const INTERRUPTED_REASON: &str = "interrupted";

pub struct Orchestrator {
    registry: WorkflowRegistry,
    store: Arc<dyn WorkflowStateStore>,
}

impl Orchestrator {
    /// The registry is frozen from here on.
    pub fn new(registry: WorkflowRegistry, store: Arc<dyn WorkflowStateStore>) -> Self {
        Self { registry, store }
    }

    /// Bind workflow `name` to `record` and persist the execution with all steps pending.
    ///
    /// The returned run has not executed anything yet; call [`WorkflowRun::execute`].
    pub async fn start_workflow(&self, name: &str, record: UploadRecord) -> AppResult<WorkflowRun> {
        let definition = self.registry.get(name)?;

        let steps: Vec<NewStep<'_>> = definition
            .steps()
            .iter()
            .map(|s| NewStep {
                name: &s.name,
                failure_behavior: s.failure_behavior,
            })
            .collect();
        let started_at = self
            .store
            .create_execution(record.id, definition.name(), &steps)
            .await?;

        tracing::info!(
            request_id = %record.id,
            workflow = %definition.name(),
            steps = steps.len(),
            started_at = %started_at,
            "Workflow execution created"
        );

        Ok(WorkflowRun {
            definition,
            record,
            store: self.store.clone(),
        })
    }

    /// Status of the execution bound to `request_id`, read from persisted rows only.
    pub async fn get_status(&self, request_id: Uuid) -> AppResult<WorkflowStatus> {
        self.store.load_status(request_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("No workflow execution for request {}", request_id))
        })
    }

    /// Resolve executions left open by a previous process.
    ///
    /// Every step that never resolved is failed with [`INTERRUPTED_REASON`]; no step
    /// is re-run. The pipeline status is then derived with the usual rules.
    /// Returns the number of executions that were closed.
    pub async fn reconcile_interrupted(&self) -> AppResult<usize> {
        let unfinished = self.store.list_unfinished().await?;
        let mut closed = 0;

        for request_id in unfinished {
            let Some(mut status) = self.store.load_status(request_id).await? else {
                continue;
            };

            for step in status.steps.iter_mut() {
                if step.status == StepStatus::Pending {
                    self.store
                        .transition_step(
                            request_id,
                            step.position,
                            StepStatus::Pending,
                            StepStatus::Running,
                            None,
                            None,
                        )
                        .await?;
                    step.status = StepStatus::Running;
                }
                if step.status == StepStatus::Running {
                    self.store
                        .transition_step(
                            request_id,
                            step.position,
                            StepStatus::Running,
                            StepStatus::Failed,
                            None,
                            Some(INTERRUPTED_REASON),
                        )
                        .await?;
                    step.status = StepStatus::Failed;
                }
            }

            let overall = derive_pipeline_status(&status.steps);
            self.store.finish_execution(request_id, overall).await?;
            closed += 1;

            tracing::warn!(
                request_id = %request_id,
                workflow = %status.workflow,
                status = %overall,
                "Interrupted workflow execution closed"
            );
        }

        Ok(closed)
    }
}

/// One execution of a workflow definition against one upload request
pub struct WorkflowRun {
    definition: Arc<WorkflowDefinition>,
    record: UploadRecord,
    store: Arc<dyn WorkflowStateStore>,
}

impl WorkflowRun {
    pub fn workflow(&self) -> &str {
        self.definition.name()
    }

    /// Run every step in definition order and return the final pipeline status.
    ///
    /// An `Err` means a status write failed; the execution is then left open and
    /// is closed by [`Orchestrator::reconcile_interrupted`] on the next start.
    #[tracing::instrument(skip(self, cancel), fields(request_id = %self.record.id, workflow = %self.definition.name()))]
    pub async fn execute(self, cancel: CancellationToken) -> AppResult<PipelineStatus> {
        let start = Instant::now();

        for (position, step) in self.definition.steps().iter().enumerate() {
            let position = position as u32;
            let succeeded = self.run_step(position, step, &cancel).await?;

            if !succeeded && step.failure_behavior == FailureBehavior::AbortPipeline {
                self.store
                    .finish_execution(self.record.id, PipelineStatus::Failed)
                    .await?;
                tracing::warn!(
                    step = %step.name,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Workflow aborted"
                );
                return Ok(PipelineStatus::Failed);
            }
        }

        self.store
            .finish_execution(self.record.id, PipelineStatus::Succeeded)
            .await?;
        tracing::info!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Workflow succeeded"
        );
        Ok(PipelineStatus::Succeeded)
    }

    /// Returns whether the step succeeded.
    async fn run_step(
        &self,
        position: u32,
        step: &StepDefinition,
        cancel: &CancellationToken,
    ) -> AppResult<bool> {
        let request_id = self.record.id;

        // Persisted before the handler runs so a crash mid-step is visible.
        self.store
            .transition_step(
                request_id,
                position,
                StepStatus::Pending,
                StepStatus::Running,
                None,
                None,
            )
            .await?;

        let step_start = Instant::now();
        let handler = step.handler.clone();
        // Handlers observe `cancel`; their future is never dropped mid-write.
        let outcome = if cancel.is_cancelled() {
            Err(AppError::Cancelled(CANCELLED_REASON.to_string()))
        } else {
            match handler.validate(&self.record).await {
                Ok(()) => handler.execute(&self.record, cancel).await,
                Err(e) => Err(e),
            }
        };

        let succeeded = match outcome {
            Ok(()) => {
                let message = match handler.report_status(&self.record).await {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!(step = %step.name, error = %e, "Step status report failed");
                        None
                    }
                };
                self.store
                    .transition_step(
                        request_id,
                        position,
                        StepStatus::Running,
                        StepStatus::Succeeded,
                        message.as_deref(),
                        None,
                    )
                    .await?;
                tracing::info!(
                    step = %step.name,
                    duration_ms = step_start.elapsed().as_secs_f64() * 1000.0,
                    "Workflow step succeeded"
                );
                true
            }
            Err(e) => {
                let reason = if e.is_cancelled() {
                    CANCELLED_REASON.to_string()
                } else {
                    e.to_string()
                };
                let failure = AppError::step_failure(step.name.clone(), e);
                tracing::error!(
                    step = %step.name,
                    request_id = %request_id,
                    content_hash = %self.record.content_hash,
                    failure_behavior = step.failure_behavior.as_str(),
                    error = %failure.detailed_message(),
                    duration_ms = step_start.elapsed().as_secs_f64() * 1000.0,
                    "Workflow step failed"
                );
                self.store
                    .transition_step(
                        request_id,
                        position,
                        StepStatus::Running,
                        StepStatus::Failed,
                        None,
                        Some(&reason),
                    )
                    .await?;
                false
            }
        };

        if let Err(e) = handler.cleanup(&self.record).await {
            tracing::warn!(step = %step.name, error = %e, "Step cleanup failed");
        }

        Ok(succeeded)
    }
}
