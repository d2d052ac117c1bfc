use async_trait::async_trait;
use clamav_client::{clean, Tcp};
use intake_core::{AppError, AppResult, ScanConfig};
use intake_storage::ObjectReader;
use std::str;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

use super::scanner::{ContentScanner, ScanVerdict};

/// Scanner backed by a clamd daemon over TCP
#[derive(Clone)]
pub struct ClamAVScanner {
    host: String,
    port: u16,
    fail_closed: bool,
    /// Timeout in seconds for each scan operation (default: 30)
    timeout_secs: u64,
    /// Objects above this size are skipped
    max_scan_size: u64,
}

/// Raw result of one clamd round trip
#[derive(Debug)]
enum ScanResult {
    Clean,
    Infected(String),
    Error(String),
}

impl ClamAVScanner {
    /// Create a new ClamAVScanner.
    ///
    /// # Arguments
    /// * `host` - ClamAV daemon hostname
    /// * `port` - ClamAV daemon port (typically 3310)
    /// * `fail_closed` - If true, treat scan failures/timeouts as errors; if false, allow (fail-open)
    /// * `max_scan_size` - Largest object, in bytes, that is sent to the daemon
    pub fn new(host: String, port: u16, fail_closed: bool, max_scan_size: u64) -> Self {
        Self::with_timeout(host, port, fail_closed, max_scan_size, 30)
    }

    /// Create with a custom scan timeout (for large files or slow ClamAV instances).
    pub fn with_timeout(
        host: String,
        port: u16,
        fail_closed: bool,
        max_scan_size: u64,
        timeout_secs: u64,
    ) -> Self {
        Self {
            host,
            port,
            fail_closed,
            timeout_secs,
            max_scan_size,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::with_timeout(
            config.clamav_host.clone(),
            config.clamav_port,
            config.clamav_fail_closed,
            config.max_scan_size_bytes,
            config.clamav_timeout_secs,
        )
    }

    /// Extract the signature name from a `stream: Eicar-Signature FOUND` reply
    fn signature_name(response: &[u8]) -> String {
        let response_str = match str::from_utf8(response) {
            Ok(s) => s.trim(),
            Err(_) => "unknown",
        };
        if response_str.contains("FOUND") {
            response_str
                .split(':')
                .nth(1)
                .unwrap_or("unknown")
                .split_whitespace()
                .next()
                .unwrap_or("unknown")
                .to_string()
        } else {
            "unknown".to_string()
        }
    }

    /// Scan in-memory data using sync API inside spawn_blocking to avoid !Send tokio futures.
    async fn scan_bytes(&self, data: Vec<u8>) -> ScanResult {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = %self.port, "Starting ClamAV scan");
        let host = self.host.clone();
        let port = self.port;
        let fail_closed = self.fail_closed;

        let timeout_secs = self.timeout_secs;
        let result = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            tokio::task::spawn_blocking(move || {
                let address = format!("{}:{}", host, port);
                let connection = Tcp {
                    host_address: address.as_str(),
                };
                match clamav_client::scan_buffer(data.as_slice(), connection, None) {
                    Ok(response_bytes) => match clean(&response_bytes) {
                        Ok(true) => {
                            tracing::info!(
                                duration_ms = start.elapsed().as_millis(),
                                "Content scan completed: clean"
                            );
                            ScanResult::Clean
                        }
                        Ok(false) => {
                            let virus_name = Self::signature_name(&response_bytes);
                            tracing::warn!(
                                duration_ms = start.elapsed().as_millis(),
                                virus = %virus_name,
                                "Content scan detected virus"
                            );
                            ScanResult::Infected(virus_name)
                        }
                        Err(e) => {
                            let error_msg = format!("Failed to parse ClamAV response: {}", e);
                            tracing::error!(error = %error_msg, "Failed to parse ClamAV response");
                            if fail_closed {
                                ScanResult::Error(error_msg)
                            } else {
                                tracing::warn!(
                                    "ClamAV response parsing failed, continuing (fail-open)"
                                );
                                ScanResult::Clean
                            }
                        }
                    },
                    Err(e) => {
                        let error_msg = format!("ClamAV scan error: {}", e);
                        tracing::error!(error = %error_msg, "ClamAV scan failed");
                        if fail_closed {
                            ScanResult::Error(error_msg)
                        } else {
                            tracing::warn!("ClamAV scan failed, continuing (fail-open)");
                            ScanResult::Clean
                        }
                    }
                }
            }),
        )
        .await;

        match result {
            Ok(Ok(sr)) => sr,
            Ok(Err(e)) => {
                let error_msg = format!("ClamAV scan task join error: {}", e);
                tracing::error!(error = %error_msg, "ClamAV scan panicked");
                ScanResult::Error(error_msg)
            }
            Err(_) => {
                let error_msg = format!("ClamAV scan timeout (exceeded {} seconds)", timeout_secs);
                tracing::error!(error = %error_msg, "ClamAV scan timeout");
                if fail_closed {
                    ScanResult::Error(error_msg)
                } else {
                    tracing::warn!("ClamAV scan timeout, continuing (fail-open)");
                    ScanResult::Clean
                }
            }
        }
    }
}

#[async_trait]
impl ContentScanner for ClamAVScanner {
    fn name(&self) -> &'static str {
        "clamav"
    }

    async fn scan(
        &self,
        content: ObjectReader,
        size: u64,
        cancel: &CancellationToken,
    ) -> AppResult<ScanVerdict> {
        if size > self.max_scan_size {
            tracing::info!(
                size_bytes = size,
                max_scan_size = self.max_scan_size,
                "Object exceeds maximum scan size, skipping ClamAV scan"
            );
            return Ok(ScanVerdict::Skipped(format!(
                "object of {} bytes exceeds scan limit of {} bytes",
                size, self.max_scan_size
            )));
        }

        // clamd takes the whole object in one INSTREAM session; memory is bounded by max_scan_size.
        let mut data = Vec::with_capacity(size as usize);
        let mut limited = content.take(self.max_scan_size);
        tokio::select! {
            res = limited.read_to_end(&mut data) => { res?; }
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled(intake_core::CANCELLED_REASON.to_string()));
            }
        }

        let result = tokio::select! {
            r = self.scan_bytes(data) => r,
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled(intake_core::CANCELLED_REASON.to_string()));
            }
        };

        match result {
            ScanResult::Clean => Ok(ScanVerdict::Clean),
            ScanResult::Infected(name) => Ok(ScanVerdict::Infected(name)),
            ScanResult::Error(msg) => Err(AppError::Internal(msg)),
        }
    }
}
