//! Storage abstraction trait
//!
//! This module defines the ObjectStorage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use intake_core::AppError;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage operation cancelled: {0}")]
    Cancelled(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming reader handed to and returned from storage backends
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {} not found", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::IoError(e) => AppError::IoFailure(e),
            StorageError::Cancelled(msg) => AppError::Cancelled(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem) must implement this trait.
/// The staging area and the permanent store are thin key-layout wrappers
/// over a shared backend, so neither depends on backend details.
///
/// **Atomicity:** `put_stream` never exposes partially written content under
/// `key`. If the reader fails or `cancel` fires, nothing is left behind.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stream `reader` to `key` until EOF and return the number of bytes written.
    async fn put_stream(
        &self,
        key: &str,
        reader: ObjectReader,
        cancel: &CancellationToken,
    ) -> StorageResult<u64>;

    /// Open the object stored at `key` for streaming reads
    async fn get_stream(&self, key: &str) -> StorageResult<ObjectReader>;

    /// Delete the object at `key`. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get the size in bytes of an object, if it exists.
    async fn content_length(&self, key: &str) -> StorageResult<u64>;

    /// Move the object at `from` to `to`, replacing any object already at `to`.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
