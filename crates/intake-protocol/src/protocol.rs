//! Upload entry point and status query path

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use intake_core::models::{
    ContentHash, FailureBehavior, PipelineStatus, UploadId, WorkflowStatus, UPLOAD_PROTOCOL,
};
use intake_core::{AppError, AppResult, CANCELLED_REASON};
use intake_db::UploadRequestStore;
use intake_services::ContentScanner;
use intake_storage::{ObjectReader, PermanentStore, StagingArea};
use intake_worker::{Orchestrator, WorkflowDefinition};

use crate::handlers::{ScanHandler, StoreHandler};
use crate::hasher::HashingReader;
use crate::tracker::UploadTracker;

pub const UPLOAD_WORKFLOW: &str = "intake.upload";
pub const STORE_STEP: &str = "intake.store";
pub const SCAN_STEP: &str = "intake.scan";

/// Store (aborts the pipeline on failure), then Scan (tolerated).
pub fn build_upload_workflow(
    staging: StagingArea,
    permanent: PermanentStore,
    scanner: Arc<dyn ContentScanner>,
) -> AppResult<WorkflowDefinition> {
    WorkflowDefinition::builder(UPLOAD_WORKFLOW)
        .step(
            STORE_STEP,
            Arc::new(StoreHandler::new(staging, permanent.clone())),
            FailureBehavior::AbortPipeline,
        )
        .step(
            SCAN_STEP,
            Arc::new(ScanHandler::new(permanent, scanner)),
            FailureBehavior::ToleratePipeline,
        )
        .build()
}

/// Handle on a pipeline running in the background
#[derive(Debug)]
pub struct WorkflowHandle {
    handle: JoinHandle<AppResult<PipelineStatus>>,
}

impl WorkflowHandle {
    pub async fn wait(self) -> AppResult<PipelineStatus> {
        self.handle
            .await
            .map_err(|e| AppError::Internal(format!("Workflow task failed: {}", e)))?
    }
}

/// Returned once an upload body has been staged and its pipeline started
#[derive(Debug)]
pub struct UploadReceipt {
    pub id: UploadId,
    pub hash: ContentHash,
    pub workflow: WorkflowHandle,
}

/// Answer to "what is the state of upload X"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStatusView {
    pub id: UploadId,
    pub size: u64,
    pub uploaded_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    pub hash: ContentHash,
}

pub struct IntakeProtocol {
    tracker: Arc<UploadTracker>,
    staging: StagingArea,
    requests: Arc<dyn UploadRequestStore>,
    orchestrator: Arc<Orchestrator>,
    max_upload_size: u64,
    /// Parent of every pipeline's cancellation token
    shutdown: CancellationToken,
}

impl IntakeProtocol {
    pub fn new(
        tracker: Arc<UploadTracker>,
        staging: StagingArea,
        requests: Arc<dyn UploadRequestStore>,
        orchestrator: Arc<Orchestrator>,
        max_upload_size: u64,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            staging,
            requests,
            orchestrator,
            max_upload_size,
            shutdown,
        }
    }

    pub fn tracker(&self) -> &Arc<UploadTracker> {
        &self.tracker
    }

    /// Stage `body`, record the request and start the upload workflow.
    ///
    /// `cancel` covers the transfer only; the pipeline runs on its own task
    /// and is cancelled by the protocol's shutdown token.
    pub async fn handle_upload(
        &self,
        body: ObjectReader,
        declared_size: u64,
        cancel: &CancellationToken,
    ) -> AppResult<UploadReceipt> {
        if declared_size == 0 {
            return Err(AppError::InvalidInput(
                "Declared upload size must be positive".to_string(),
            ));
        }
        if declared_size > self.max_upload_size {
            return Err(AppError::InvalidInput(format!(
                "Declared upload size {} exceeds the maximum of {} bytes",
                declared_size, self.max_upload_size
            )));
        }

        let id = Uuid::new_v4();
        self.tracker.register(id, declared_size, None)?;

        let tracker = self.tracker.clone();
        let reader = HashingReader::new(body).with_progress(move |bytes| {
            // The entry may already be gone if the sweeper ran; progress is best effort.
            let _ = tracker.record_progress(id, bytes);
        });
        let outcome = reader.outcome();

        let staged = match self
            .staging
            .put_temporary_upload(id, Box::pin(reader), cancel)
            .await
        {
            Ok(staged) => staged,
            Err(e) => {
                self.abandon(id).await;
                return Err(e.into());
            }
        };

        if staged != declared_size {
            self.abandon(id).await;
            return Err(AppError::InvalidInput(format!(
                "Upload body has {} bytes but {} were declared",
                staged, declared_size
            )));
        }
        let Some(hash) = outcome.get() else {
            self.abandon(id).await;
            return Err(AppError::Internal(format!(
                "Upload {} was staged without a content hash",
                id
            )));
        };
        if cancel.is_cancelled() {
            self.abandon(id).await;
            return Err(AppError::Cancelled(CANCELLED_REASON.to_string()));
        }

        if let Err(e) = self.tracker.set_hash(id, hash.clone()) {
            tracing::debug!(upload_id = %id, error = %e, "Tracker entry not updated with hash");
        }

        let record = match self
            .requests
            .create_request(id, UPLOAD_PROTOCOL, &hash, declared_size)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                self.abandon(id).await;
                return Err(e);
            }
        };

        // The request row stays; with no execution it reads as not completed.
        let run = match self.orchestrator.start_workflow(UPLOAD_WORKFLOW, record).await {
            Ok(run) => run,
            Err(e) => {
                self.abandon(id).await;
                return Err(e);
            }
        };

        tracing::info!(
            upload_id = %id,
            size_bytes = declared_size,
            hash = %hash,
            workflow = %run.workflow(),
            "Upload staged and workflow started"
        );

        let token = self.shutdown.child_token();
        let tracker = self.tracker.clone();
        let handle = tokio::spawn(async move {
            let status = run.execute(token).await;
            match &status {
                Ok(PipelineStatus::Succeeded) => {
                    if let Err(e) = tracker.mark_complete(id) {
                        tracing::debug!(upload_id = %id, error = %e, "Tracker entry not marked complete");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(
                        upload_id = %id,
                        error = %e,
                        "Workflow execution stopped before resolving"
                    );
                }
            }
            status
        });

        Ok(UploadReceipt {
            id,
            hash,
            workflow: WorkflowHandle { handle },
        })
    }

    /// Combine the durable request, the workflow record and the tracker.
    pub async fn query_upload_status(
        &self,
        id: UploadId,
        cancel: &CancellationToken,
    ) -> AppResult<UploadStatusView> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled(CANCELLED_REASON.to_string())),
            res = self.load_upload_status(id) => res,
        }
    }

    /// Per-step statuses of the upload's workflow execution.
    pub async fn workflow_status(
        &self,
        id: UploadId,
        cancel: &CancellationToken,
    ) -> AppResult<WorkflowStatus> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled(CANCELLED_REASON.to_string())),
            res = self.orchestrator.get_status(id) => res,
        }
    }

    async fn load_upload_status(&self, id: UploadId) -> AppResult<UploadStatusView> {
        let record = self
            .requests
            .get_request(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload {} not found", id)))?;

        let execution = match self.orchestrator.get_status(id).await {
            Ok(status) => Some(status),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let completed = execution
            .as_ref()
            .is_some_and(|s| s.overall == PipelineStatus::Succeeded);
        let started_at = execution
            .as_ref()
            .map(|s| s.started_at)
            .unwrap_or(record.created_at);

        // Without a resident entry there is no live counter; a completed
        // upload is reported as fully received.
        let uploaded_bytes = match self.tracker.get(id) {
            Some(state) => state.uploaded_bytes,
            None if completed => record.declared_size,
            None => 0,
        };

        Ok(UploadStatusView {
            id,
            size: record.declared_size,
            uploaded_bytes,
            started_at,
            completed,
            hash: record.content_hash,
        })
    }

    async fn abandon(&self, id: UploadId) {
        if let Err(e) = self.staging.delete_temporary_upload(id).await {
            tracing::warn!(upload_id = %id, error = %e, "Failed to remove abandoned staging copy");
        }
        self.tracker.evict(id);
    }
}
