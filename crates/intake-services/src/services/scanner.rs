//! Content scanner contract

use async_trait::async_trait;
use intake_core::AppResult;
use intake_storage::ObjectReader;
use tokio_util::sync::CancellationToken;

/// Outcome of scanning one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Malicious content was found; carries the signature name
    Infected(String),
    /// The scanner declined to inspect the content (e.g. too large)
    Skipped(String),
}

impl ScanVerdict {
    /// Human-readable status recorded on the Scan step
    pub fn describe(&self) -> String {
        match self {
            ScanVerdict::Clean => "Scan completed".to_string(),
            ScanVerdict::Infected(signature) => format!("Infected: {}", signature),
            ScanVerdict::Skipped(reason) => format!("Scan skipped: {}", reason),
        }
    }
}

/// Inspects stored content. Errors mean the scan itself could not be performed.
#[async_trait]
pub trait ContentScanner: Send + Sync {
    fn name(&self) -> &'static str;

    async fn scan(
        &self,
        content: ObjectReader,
        size: u64,
        cancel: &CancellationToken,
    ) -> AppResult<ScanVerdict>;
}

/// Baseline scanner: every object is clean
#[derive(Debug, Clone, Default)]
pub struct NoOpScanner;

#[async_trait]
impl ContentScanner for NoOpScanner {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn scan(
        &self,
        _content: ObjectReader,
        _size: u64,
        _cancel: &CancellationToken,
    ) -> AppResult<ScanVerdict> {
        Ok(ScanVerdict::Clean)
    }
}
