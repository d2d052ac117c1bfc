//! Step handler trait
//!
//! Each workflow step is bound to one handler. The orchestrator calls
//! `validate` then `execute`, asks for a status line on success, and always
//! gives the handler a chance to `cleanup` once the step has resolved. A step
//! reached after cancellation fails without its handler being called.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use intake_core::models::UploadRecord;
use intake_core::AppResult;

#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Check handler-specific preconditions. A failure here fails the step
    /// exactly like an execution failure.
    async fn validate(&self, record: &UploadRecord) -> AppResult<()>;

    /// Perform the step.
    ///
    /// The orchestrator never drops this future, so a handler that writes must
    /// observe `cancel` itself and either finish or undo its write before returning.
    async fn execute(&self, record: &UploadRecord, cancel: &CancellationToken) -> AppResult<()>;

    /// Human-readable status stored with a succeeded step
    async fn report_status(&self, _record: &UploadRecord) -> AppResult<String> {
        Ok("completed".to_string())
    }

    /// Release per-step resources. Errors are logged and never fail the step.
    async fn cleanup(&self, _record: &UploadRecord) -> AppResult<()> {
        Ok(())
    }
}
