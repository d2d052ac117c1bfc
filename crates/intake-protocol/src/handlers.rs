//! Step handlers of the upload workflow

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use intake_core::models::{UploadId, UploadRecord};
use intake_core::{AppError, AppResult, CANCELLED_REASON};
use intake_services::{ContentScanner, ScanVerdict};
use intake_storage::{PermanentStore, StagingArea, StoredObject};
use intake_worker::StepHandler;

use crate::hasher::HashingReader;

/// Moves a staged upload into content-addressed permanent storage.
pub struct StoreHandler {
    staging: StagingArea,
    permanent: PermanentStore,
}

impl StoreHandler {
    pub fn new(staging: StagingArea, permanent: PermanentStore) -> Self {
        Self { staging, permanent }
    }

    async fn discard(&self, stored: &StoredObject) {
        if let Err(e) = self.permanent.discard_object(stored).await {
            tracing::error!(
                key = %stored.key,
                error = %e,
                "Failed to discard unverified object"
            );
        }
    }
}

#[async_trait]
impl StepHandler for StoreHandler {
    async fn validate(&self, record: &UploadRecord) -> AppResult<()> {
        if record.declared_size == 0 {
            return Err(AppError::InvalidInput(format!(
                "Upload {} has no declared size",
                record.id
            )));
        }
        if record.content_hash.digest().is_empty() {
            return Err(AppError::InvalidInput(format!(
                "Upload {} has no content hash",
                record.id
            )));
        }
        Ok(())
    }

    async fn execute(&self, record: &UploadRecord, cancel: &CancellationToken) -> AppResult<()> {
        let start = Instant::now();
        let staged = self.staging.get_temporary_upload(record.id).await?;

        let reader = HashingReader::new(staged);
        let outcome = reader.outcome();
        let stored = self
            .permanent
            .upload_object(
                record.id,
                Box::pin(reader),
                record.declared_size,
                &record.content_hash,
                cancel,
            )
            .await?;

        if !stored.deduplicated && outcome.get().as_ref() != Some(&record.content_hash) {
            self.discard(&stored).await;
            return Err(AppError::InvalidInput(format!(
                "Staged content of upload {} does not match its record ({} of {} bytes)",
                record.id, stored.size, record.declared_size
            )));
        }

        // Last point at which cancellation can still stop the step.
        if cancel.is_cancelled() {
            self.discard(&stored).await;
            return Err(AppError::Cancelled(CANCELLED_REASON.to_string()));
        }

        if let Err(e) = self.permanent.commit_object(&stored).await {
            self.discard(&stored).await;
            return Err(e.into());
        }

        if let Err(e) = self.staging.delete_temporary_upload(record.id).await {
            tracing::warn!(
                upload_id = %record.id,
                error = %e,
                "Failed to delete staged upload after store"
            );
        }

        tracing::info!(
            upload_id = %record.id,
            key = %stored.key,
            size_bytes = stored.size,
            deduplicated = stored.deduplicated,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload stored"
        );
        Ok(())
    }

    async fn report_status(&self, _record: &UploadRecord) -> AppResult<String> {
        Ok("Upload completed".to_string())
    }
}

/// Runs the configured content scanner over the stored object.
pub struct ScanHandler {
    permanent: PermanentStore,
    scanner: Arc<dyn ContentScanner>,
    // Verdicts awaiting report_status, keyed by upload
    verdicts: DashMap<UploadId, ScanVerdict>,
}

impl ScanHandler {
    pub fn new(permanent: PermanentStore, scanner: Arc<dyn ContentScanner>) -> Self {
        Self {
            permanent,
            scanner,
            verdicts: DashMap::new(),
        }
    }
}

#[async_trait]
impl StepHandler for ScanHandler {
    async fn validate(&self, _record: &UploadRecord) -> AppResult<()> {
        Ok(())
    }

    async fn execute(&self, record: &UploadRecord, cancel: &CancellationToken) -> AppResult<()> {
        let start = Instant::now();
        let content = self.permanent.open_object(&record.content_hash).await?;
        let verdict = self
            .scanner
            .scan(content, record.declared_size, cancel)
            .await?;

        tracing::info!(
            upload_id = %record.id,
            scanner = self.scanner.name(),
            verdict = %verdict.describe(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Content scan finished"
        );

        if let ScanVerdict::Infected(signature) = &verdict {
            return Err(AppError::InvalidInput(format!(
                "Malicious content detected: {}",
                signature
            )));
        }
        self.verdicts.insert(record.id, verdict);
        Ok(())
    }

    async fn report_status(&self, record: &UploadRecord) -> AppResult<String> {
        Ok(self
            .verdicts
            .remove(&record.id)
            .map(|(_, verdict)| verdict.describe())
            .unwrap_or_else(|| ScanVerdict::Clean.describe()))
    }

    async fn cleanup(&self, record: &UploadRecord) -> AppResult<()> {
        self.verdicts.remove(&record.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_stream;
    use chrono::Utc;
    use intake_core::models::{ContentHash, UPLOAD_PROTOCOL};
    use intake_services::NoOpScanner;
    use intake_storage::{LocalStorage, ObjectReader, ObjectStorage};
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use uuid::Uuid;

    fn reader(data: &[u8]) -> ObjectReader {
        Box::pin(std::io::Cursor::new(data.to_vec()))
    }

    async fn areas(dir: &std::path::Path) -> (StagingArea, PermanentStore) {
        let backend: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(dir).await.unwrap());
        (StagingArea::new(backend.clone()), PermanentStore::new(backend))
    }

    async fn staged_record(staging: &StagingArea, data: &[u8]) -> UploadRecord {
        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        staging
            .put_temporary_upload(id, reader(data), &token)
            .await
            .unwrap();
        let hash = hash_stream(&mut std::io::Cursor::new(data.to_vec()), &token)
            .await
            .unwrap();
        UploadRecord {
            id,
            protocol: UPLOAD_PROTOCOL.to_string(),
            declared_size: data.len() as u64,
            content_hash: hash,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_store_moves_staged_content() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let record = staged_record(&staging, b"some payload").await;
        let handler = StoreHandler::new(staging.clone(), permanent.clone());

        handler.validate(&record).await.unwrap();
        handler
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!staging.has_temporary_upload(record.id).await.unwrap());
        let mut out = Vec::new();
        permanent
            .open_object(&record.content_hash)
            .await
            .unwrap()
            .read_to_end(&mut out)
            .await
            .unwrap();
        assert_eq!(out, b"some payload");
        assert_eq!(handler.report_status(&record).await.unwrap(), "Upload completed");
    }

    #[tokio::test]
    async fn test_store_rejects_mismatched_content() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let mut record = staged_record(&staging, b"some payload").await;
        record.content_hash = ContentHash::sha2_256(vec![3u8; 32], 12).unwrap();
        let handler = StoreHandler::new(staging.clone(), permanent.clone());

        let err = handler
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert!(!permanent.has_object(&record.content_hash).await.unwrap());
        assert!(!dir.path().join("pending").join(record.id.to_string()).exists());
        assert!(staging.has_temporary_upload(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_mismatch_keeps_existing_object() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let good = staged_record(&staging, b"shared payload").await;
        let handler = StoreHandler::new(staging.clone(), permanent.clone());
        handler
            .execute(&good, &CancellationToken::new())
            .await
            .unwrap();

        // Same claimed hash, different bytes of a different length.
        let mut bad = staged_record(&staging, b"forged").await;
        bad.content_hash = good.content_hash.clone();
        assert!(handler
            .execute(&bad, &CancellationToken::new())
            .await
            .is_err());

        let mut out = Vec::new();
        permanent
            .open_object(&good.content_hash)
            .await
            .unwrap()
            .read_to_end(&mut out)
            .await
            .unwrap();
        assert_eq!(out, b"shared payload");
    }

    #[tokio::test]
    async fn test_store_cancelled_leaves_no_object() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let record = staged_record(&staging, b"cancel me").await;
        let handler = StoreHandler::new(staging.clone(), permanent.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = handler.execute(&record, &token).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!permanent.has_object(&record.content_hash).await.unwrap());
        assert!(!dir.path().join("pending").join(record.id.to_string()).exists());
        assert!(staging.has_temporary_upload(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_missing_staging_fails() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let mut record = staged_record(&staging, b"abc").await;
        record.id = Uuid::new_v4();
        let handler = StoreHandler::new(staging, permanent);

        let err = handler
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_validation() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let mut record = staged_record(&staging, b"abc").await;
        let handler = StoreHandler::new(staging, permanent);

        record.declared_size = 0;
        assert!(matches!(
            handler.validate(&record).await,
            Err(AppError::InvalidInput(_))
        ));
    }

    struct InfectedScanner;

    #[async_trait]
    impl ContentScanner for InfectedScanner {
        fn name(&self) -> &'static str {
            "infected"
        }

        async fn scan(
            &self,
            _content: ObjectReader,
            _size: u64,
            _cancel: &CancellationToken,
        ) -> AppResult<ScanVerdict> {
            Ok(ScanVerdict::Infected("Eicar-Test-Signature".to_string()))
        }
    }

    #[tokio::test]
    async fn test_scan_reports_verdict() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let record = staged_record(&staging, b"clean bytes").await;
        StoreHandler::new(staging, permanent.clone())
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap();

        let handler = ScanHandler::new(permanent, Arc::new(NoOpScanner));
        handler
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handler.report_status(&record).await.unwrap(), "Scan completed");
    }

    #[tokio::test]
    async fn test_scan_infected_fails_step() {
        let dir = tempdir().unwrap();
        let (staging, permanent) = areas(dir.path()).await;
        let record = staged_record(&staging, b"bad bytes").await;
        StoreHandler::new(staging, permanent.clone())
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap();

        let handler = ScanHandler::new(permanent, Arc::new(InfectedScanner));
        let err = handler
            .execute(&record, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Eicar-Test-Signature"));
    }
}
