//! Intake Services Layer
//!
//! Content scanning services used by the Scan step. The baseline scanner
//! accepts everything; the ClamAV scanner delegates to a clamd daemon.
//! Keep scanning logic here; keep workflow coordination in intake-protocol.

pub mod services;

pub use services::scanner::{ContentScanner, NoOpScanner, ScanVerdict};
#[cfg(feature = "clamav")]
pub use services::clamav::ClamAVScanner;
