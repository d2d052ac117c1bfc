//! Shared key generation for storage backends.
//!
//! Key format: staged uploads live at `staging/{upload_id}`; content being
//! written to permanent storage at `pending/{upload_id}` until it is verified;
//! permanent objects at `objects/{base58 multihash}`.

use intake_core::models::{ContentHash, UploadId};

use crate::traits::{StorageError, StorageResult};

pub const STAGING_PREFIX: &str = "staging";
pub const PENDING_PREFIX: &str = "pending";
pub const OBJECTS_PREFIX: &str = "objects";

/// Key of the temporary copy of an in-flight upload
pub fn staging_key(id: UploadId) -> String {
    format!("{}/{}", STAGING_PREFIX, id)
}

/// Key an upload's permanent copy is written to before verification
pub fn pending_key(id: UploadId) -> String {
    format!("{}/{}", PENDING_PREFIX, id)
}

/// Key of a permanent object. Equal content always maps to the same key.
pub fn object_key(hash: &ContentHash) -> String {
    format!("{}/{}", OBJECTS_PREFIX, hash.to_base58())
}

/// Keys must not contain `..` or a leading `/`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid characters: {}",
            key
        )));
    }
    Ok(())
}
