//! Upload models: the durable request record and the in-memory progress state

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::hash::ContentHash;

/// Identifier assigned when an upload is initiated; equal to the request id.
pub type UploadId = Uuid;

/// Protocol tag stored on every request created by the intake entry point
pub const UPLOAD_PROTOCOL: &str = "upload";

/// Durable record of an upload request. Never deleted by the intake pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub id: UploadId,
    pub protocol: String,
    pub declared_size: u64,
    pub content_hash: ContentHash,
    pub created_at: DateTime<Utc>,
}

/// In-memory progress of an upload, owned by the upload tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    pub id: UploadId,
    pub size: u64,
    pub uploaded_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    pub hash: Option<ContentHash>,
}

impl UploadState {
    pub fn new(id: UploadId, size: u64, hash: Option<ContentHash>) -> Self {
        Self {
            id,
            size,
            uploaded_bytes: 0,
            started_at: Utc::now(),
            completed: false,
            hash,
        }
    }
}
