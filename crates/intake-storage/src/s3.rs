use crate::keys::validate_key;
use crate::traits::{ObjectReader, ObjectStorage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, Result as ObjectResult, WriteMultipart};
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Part size for multipart uploads
const PART_SIZE: usize = 8 * 1024 * 1024;
/// Parts allowed in flight at once
const MAX_IN_FLIGHT_PARTS: usize = 4;
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// S3 storage implementation
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        // Credentials come from the environment; bucket and region are explicit.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket.clone());

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage { store, bucket })
    }

    fn location(key: &str) -> StorageResult<Path> {
        validate_key(key)?;
        Ok(Path::from(key.to_string()))
    }

    /// Copy `reader` into an open multipart upload. The caller aborts on error.
    async fn write_parts(
        writer: &mut WriteMultipart,
        reader: &mut ObjectReader,
        key: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<u64> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let mut total = 0u64;

        loop {
            let n = tokio::select! {
                res = reader.read(&mut buf) => res.map_err(|e| {
                    StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
                })?,
                _ = cancel.cancelled() => return Err(StorageError::Cancelled(key.to_string())),
            };
            if n == 0 {
                break;
            }

            writer
                .wait_for_capacity(MAX_IN_FLIGHT_PARTS)
                .await
                .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
            writer.write(&buf[..n]);
            total += n as u64;
        }

        Ok(total)
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_stream(
        &self,
        key: &str,
        mut reader: ObjectReader,
        cancel: &CancellationToken,
    ) -> StorageResult<u64> {
        let location = Self::location(key)?;
        let start = std::time::Instant::now();

        let upload = self
            .store
            .put_multipart(&location)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, PART_SIZE);

        // The object only becomes visible once `finish` completes the upload.
        let size = match Self::write_parts(&mut writer, &mut reader, key, cancel).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(
                        error = %abort_err,
                        bucket = %self.bucket,
                        key = %key,
                        "Failed to abort S3 multipart upload"
                    );
                }
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream upload failed"
                );
                return Err(e);
            }
        };

        let result: ObjectResult<_> = writer.finish().await;
        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 stream upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 stream upload successful"
        );

        Ok(size)
    }

    async fn get_stream(&self, key: &str) -> StorageResult<ObjectReader> {
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.get(&location).await;
        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %key,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let stream = result
            .into_stream()
            .map_err(|e| std::io::Error::other(e.to_string()));

        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let location = Self::location(key)?;

        let result: ObjectResult<_> = self.store.delete(&location).await;

        match result {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 delete failed"
                );
                return Err(StorageError::DeleteFailed(e.to_string()));
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    async fn content_length(&self, key: &str) -> StorageResult<u64> {
        let location = Self::location(key)?;
        match self.store.head(&location).await {
            Ok(meta) => Ok(meta.size),
            Err(ObjectStoreError::NotFound { .. }) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    /// S3 has no rename; copy then delete the source.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let from_location = Self::location(from)?;
        let to_location = Self::location(to)?;

        let copy_result: ObjectResult<_> = self.store.copy(&from_location, &to_location).await;
        copy_result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(from.to_string()),
            other => StorageError::BackendError(other.to_string()),
        })?;
        self.delete(from).await?;

        tracing::info!(
            bucket = %self.bucket,
            from_key = %from,
            to_key = %to,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 rename successful"
        );
        Ok(())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
