//! Staging area and permanent store
//!
//! Both wrap a shared [`ObjectStorage`] backend and own their key layout, so
//! callers deal in upload ids and content hashes rather than raw keys.

use std::sync::Arc;

use intake_core::models::{ContentHash, UploadId};
use tokio_util::sync::CancellationToken;

use crate::keys::{object_key, pending_key, staging_key};
use crate::traits::{ObjectReader, ObjectStorage, StorageResult};

/// Temporary copies of uploads awaiting the Store step
#[derive(Clone)]
pub struct StagingArea {
    backend: Arc<dyn ObjectStorage>,
}

impl StagingArea {
    pub fn new(backend: Arc<dyn ObjectStorage>) -> Self {
        Self { backend }
    }

    /// Stage the payload of upload `id`; returns the number of bytes staged.
    pub async fn put_temporary_upload(
        &self,
        id: UploadId,
        data: ObjectReader,
        cancel: &CancellationToken,
    ) -> StorageResult<u64> {
        self.backend.put_stream(&staging_key(id), data, cancel).await
    }

    pub async fn get_temporary_upload(&self, id: UploadId) -> StorageResult<ObjectReader> {
        self.backend.get_stream(&staging_key(id)).await
    }

    pub async fn delete_temporary_upload(&self, id: UploadId) -> StorageResult<()> {
        self.backend.delete(&staging_key(id)).await
    }

    pub async fn has_temporary_upload(&self, id: UploadId) -> StorageResult<bool> {
        self.backend.exists(&staging_key(id)).await
    }
}

/// Content written to permanent storage for one upload
///
/// A fresh write sits under a per-upload pending key until
/// [`PermanentStore::commit_object`] moves it to `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    /// True when an object with the same content was already present and the write was skipped
    pub deduplicated: bool,
    pending_key: Option<String>,
}

/// Content-addressed permanent storage
#[derive(Clone)]
pub struct PermanentStore {
    backend: Arc<dyn ObjectStorage>,
}

impl PermanentStore {
    pub fn new(backend: Arc<dyn ObjectStorage>) -> Self {
        Self { backend }
    }

    /// Write `data` for upload `id`, to be published under the name derived from `hash`.
    ///
    /// If an object of the same name and length already exists the write is
    /// skipped and `data` is left unread. Otherwise nothing is visible under
    /// the object key until the result is committed.
    pub async fn upload_object(
        &self,
        id: UploadId,
        data: ObjectReader,
        size: u64,
        hash: &ContentHash,
        cancel: &CancellationToken,
    ) -> StorageResult<StoredObject> {
        let key = object_key(hash);

        if self.backend.exists(&key).await? && self.backend.content_length(&key).await? == size {
            tracing::debug!(key = %key, size_bytes = size, "Object already stored, skipping write");
            return Ok(StoredObject {
                key,
                size,
                deduplicated: true,
                pending_key: None,
            });
        }

        let pending = pending_key(id);
        let written = self.backend.put_stream(&pending, data, cancel).await?;
        Ok(StoredObject {
            key,
            size: written,
            deduplicated: false,
            pending_key: Some(pending),
        })
    }

    /// Publish a verified write under its object key.
    pub async fn commit_object(&self, stored: &StoredObject) -> StorageResult<()> {
        match &stored.pending_key {
            Some(pending) => self.backend.rename(pending, &stored.key).await,
            None => Ok(()),
        }
    }

    /// Drop an uncommitted write. Objects that were already present are left alone.
    pub async fn discard_object(&self, stored: &StoredObject) -> StorageResult<()> {
        match &stored.pending_key {
            Some(pending) => self.backend.delete(pending).await,
            None => Ok(()),
        }
    }

    pub async fn open_object(&self, hash: &ContentHash) -> StorageResult<ObjectReader> {
        self.backend.get_stream(&object_key(hash)).await
    }

    pub async fn has_object(&self, hash: &ContentHash) -> StorageResult<bool> {
        self.backend.exists(&object_key(hash)).await
    }
}

#[cfg(all(test, feature = "storage-local"))]
mod tests {
    use super::*;
    use crate::traits::StorageError;
    use crate::LocalStorage;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use uuid::Uuid;

    fn reader(data: &[u8]) -> ObjectReader {
        Box::pin(std::io::Cursor::new(data.to_vec()))
    }

    async fn backend(dir: &std::path::Path) -> Arc<dyn ObjectStorage> {
        Arc::new(LocalStorage::new(dir).await.unwrap())
    }

    #[tokio::test]
    async fn test_staging_lifecycle() {
        let dir = tempdir().unwrap();
        let staging = StagingArea::new(backend(dir.path()).await);
        let token = CancellationToken::new();
        let id = Uuid::new_v4();

        let staged = staging
            .put_temporary_upload(id, reader(b"payload"), &token)
            .await
            .unwrap();
        assert_eq!(staged, 7);
        assert!(dir.path().join("staging").join(id.to_string()).exists());

        let mut out = Vec::new();
        staging
            .get_temporary_upload(id)
            .await
            .unwrap()
            .read_to_end(&mut out)
            .await
            .unwrap();
        assert_eq!(out, b"payload");

        staging.delete_temporary_upload(id).await.unwrap();
        assert!(!staging.has_temporary_upload(id).await.unwrap());
        assert!(matches!(
            staging.get_temporary_upload(id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_permanent_store_deduplicates() {
        let dir = tempdir().unwrap();
        let store = PermanentStore::new(backend(dir.path()).await);
        let token = CancellationToken::new();
        let hash = ContentHash::sha2_256(vec![1u8; 32], 5).unwrap();

        let first = store
            .upload_object(Uuid::new_v4(), reader(b"hello"), 5, &hash, &token)
            .await
            .unwrap();
        assert!(!first.deduplicated);
        assert_eq!(first.size, 5);
        store.commit_object(&first).await.unwrap();

        let second = store
            .upload_object(Uuid::new_v4(), reader(b"hello"), 5, &hash, &token)
            .await
            .unwrap();
        assert!(second.deduplicated);
        assert_eq!(first.key, second.key);

        // Discarding a deduplicated result keeps the shared object.
        store.discard_object(&second).await.unwrap();
        assert!(store.has_object(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_uncommitted_write_is_not_published() {
        let dir = tempdir().unwrap();
        let store = PermanentStore::new(backend(dir.path()).await);
        let token = CancellationToken::new();
        let hash = ContentHash::sha2_256(vec![2u8; 32], 5).unwrap();
        let id = Uuid::new_v4();

        let stored = store
            .upload_object(id, reader(b"hello"), 5, &hash, &token)
            .await
            .unwrap();
        assert!(!store.has_object(&hash).await.unwrap());
        assert!(dir.path().join("pending").join(id.to_string()).exists());

        store.discard_object(&stored).await.unwrap();
        assert!(!store.has_object(&hash).await.unwrap());
        assert!(!dir.path().join("pending").join(id.to_string()).exists());
    }
}
