//! Intake Storage Library
//!
//! This crate provides the object-storage abstraction for the intake pipeline
//! and implementations for S3 and the local filesystem.
//!
//! # Storage key format
//!
//! - **Staged uploads**: `staging/{upload_id}`
//! - **Unverified permanent copies**: `pending/{upload_id}`
//! - **Permanent objects**: `objects/{base58 multihash}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized in the
//! `keys` module so all backends stay consistent.

pub mod areas;
pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use areas::{PermanentStore, StagingArea, StoredObject};
pub use factory::create_storage;
pub use intake_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ObjectReader, ObjectStorage, StorageError, StorageResult};
