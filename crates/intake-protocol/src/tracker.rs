//! In-memory upload progress tracker
//!
//! A cache over the durable records: it answers live byte progress for
//! uploads that are still resident and is never authoritative for completion.
//! Entries live in a sharded map; every operation holds one shard lock only
//! for the read-modify-write of a single entry.

use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use intake_core::models::{ContentHash, UploadId, UploadState};
use intake_core::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct UploadTracker {
    uploads: DashMap<UploadId, UploadState>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `id`. An id that is already resident is rejected.
    pub fn register(&self, id: UploadId, size: u64, hash: Option<ContentHash>) -> AppResult<()> {
        match self.uploads.entry(id) {
            Entry::Occupied(_) => Err(AppError::InvalidInput(format!(
                "Upload {} is already registered",
                id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(UploadState::new(id, size, hash));
                tracing::debug!(upload_id = %id, size_bytes = size, "Upload registered");
                Ok(())
            }
        }
    }

    /// Snapshot of the entry for `id`.
    pub fn progress(&self, id: UploadId) -> AppResult<UploadState> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} is not tracked", id)))
    }

    pub fn get(&self, id: UploadId) -> Option<UploadState> {
        self.uploads.get(&id).map(|state| state.clone())
    }

    /// Add `bytes` to the received count. Ignored once the entry is complete.
    pub fn record_progress(&self, id: UploadId, bytes: u64) -> AppResult<()> {
        let mut state = self
            .uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} is not tracked", id)))?;
        if !state.completed {
            state.uploaded_bytes = state.uploaded_bytes.saturating_add(bytes).min(state.size);
        }
        Ok(())
    }

    /// Attach the content hash. Setting the same hash again is a no-op.
    pub fn set_hash(&self, id: UploadId, hash: ContentHash) -> AppResult<()> {
        let mut state = self
            .uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} is not tracked", id)))?;
        if let Some(existing) = &state.hash {
            if *existing != hash {
                return Err(AppError::InvalidInput(format!(
                    "Upload {} already has hash {}",
                    id, existing
                )));
            }
            return Ok(());
        }
        state.hash = Some(hash);
        Ok(())
    }

    /// Pin the entry at its full size.
    pub fn mark_complete(&self, id: UploadId) -> AppResult<()> {
        let mut state = self
            .uploads
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Upload {} is not tracked", id)))?;
        state.completed = true;
        state.uploaded_bytes = state.size;
        Ok(())
    }

    pub fn evict(&self, id: UploadId) -> Option<UploadState> {
        self.uploads.remove(&id).map(|(_, state)| state)
    }

    /// Drop entries started more than `max_age` ago whose body has been fully
    /// received. Uploads still streaming are kept regardless of age.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let cutoff = Utc::now() - max_age;
        let mut evicted = 0;
        self.uploads.retain(|_, state| {
            let keep = state.hash.is_none() || state.started_at > cutoff;
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::sha2_256(vec![byte; 32], 10).unwrap()
    }

    #[test]
    fn test_register_and_progress() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, 10, None).unwrap();

        let state = tracker.progress(id).unwrap();
        assert_eq!(state.size, 10);
        assert_eq!(state.uploaded_bytes, 0);
        assert!(!state.completed);
        assert!(state.hash.is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, 10, None).unwrap();
        tracker.record_progress(id, 4).unwrap();

        assert!(matches!(
            tracker.register(id, 99, None),
            Err(AppError::InvalidInput(_))
        ));
        // The original entry is untouched.
        assert_eq!(tracker.progress(id).unwrap().uploaded_bytes, 4);
        assert_eq!(tracker.progress(id).unwrap().size, 10);
    }

    #[test]
    fn test_unknown_upload_not_found() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        assert!(matches!(tracker.progress(id), Err(AppError::NotFound(_))));
        assert!(matches!(tracker.mark_complete(id), Err(AppError::NotFound(_))));
        assert!(matches!(tracker.record_progress(id, 1), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_progress_is_monotonic_and_pinned_after_completion() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, 10, None).unwrap();

        let mut last = 0;
        for chunk in [3, 0, 4, 2] {
            tracker.record_progress(id, chunk).unwrap();
            let now = tracker.progress(id).unwrap().uploaded_bytes;
            assert!(now >= last);
            last = now;
        }
        assert_eq!(last, 9);

        tracker.record_progress(id, 50).unwrap();
        assert_eq!(tracker.progress(id).unwrap().uploaded_bytes, 10);

        tracker.mark_complete(id).unwrap();
        tracker.record_progress(id, 5).unwrap();
        let state = tracker.progress(id).unwrap();
        assert!(state.completed);
        assert_eq!(state.uploaded_bytes, 10);
    }

    #[test]
    fn test_set_hash_once() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, 10, None).unwrap();

        tracker.set_hash(id, hash(1)).unwrap();
        tracker.set_hash(id, hash(1)).unwrap();
        assert!(matches!(
            tracker.set_hash(id, hash(2)),
            Err(AppError::InvalidInput(_))
        ));
        assert_eq!(tracker.progress(id).unwrap().hash, Some(hash(1)));
    }

    #[test]
    fn test_evict_stale_keeps_streaming_uploads() {
        let tracker = UploadTracker::new();
        let received = Uuid::new_v4();
        let streaming = Uuid::new_v4();
        tracker.register(received, 10, Some(hash(1))).unwrap();
        tracker.register(streaming, 10, None).unwrap();

        assert_eq!(tracker.evict_stale(Duration::from_secs(3600)), 0);
        assert_eq!(tracker.evict_stale(Duration::ZERO), 1);
        assert!(tracker.get(received).is_none());
        assert!(tracker.get(streaming).is_some());

        assert!(tracker.evict(streaming).is_some());
        assert!(tracker.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_do_not_interfere() {
        let tracker = Arc::new(UploadTracker::new());
        let mut tasks = Vec::new();

        for i in 0..16u64 {
            let tracker = tracker.clone();
            tasks.push(tokio::spawn(async move {
                let id = Uuid::new_v4();
                let size = 100 * (i + 1);
                tracker.register(id, size, None).unwrap();
                for _ in 0..(i + 1) {
                    tracker.record_progress(id, 100).unwrap();
                    tokio::task::yield_now().await;
                }
                (id, size)
            }));
        }

        for task in tasks {
            let (id, size) = task.await.unwrap();
            let state = tracker.progress(id).unwrap();
            assert_eq!(state.size, size);
            assert_eq!(state.uploaded_bytes, size);
        }
        assert_eq!(tracker.len(), 16);
    }
}
