//! Upload ingestion protocol
//!
//! Streams an upload body into staging while hashing it, tracks byte progress
//! in memory, records the durable request and hands it to the upload workflow
//! (Store, then Scan). Status queries combine the durable records with the
//! in-memory tracker.

pub mod handlers;
pub mod hasher;
pub mod protocol;
pub mod tracker;

pub use handlers::{ScanHandler, StoreHandler};
pub use hasher::{hash_stream, HashOutcome, HashingReader, HASH_BUFFER_SIZE};
pub use protocol::{
    build_upload_workflow, IntakeProtocol, UploadReceipt, UploadStatusView, WorkflowHandle,
    SCAN_STEP, STORE_STEP, UPLOAD_WORKFLOW,
};
pub use tracker::UploadTracker;
