//! Errors shared by every intake crate
//!
//! `AppError` holds the ingestion failures (missing upload, bad input, I/O,
//! unknown workflow, failed step) and the infrastructure failures underneath
//! them. How each variant is shown to clients lives in one table of
//! [`Presentation`] constants, exposed through [`ErrorMetadata`].
//!
//! With the `sqlx` feature off, `Database` carries a plain message.

use std::error::Error as StdError;
use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Reason recorded on a step that was stopped by a cancellation signal.
pub const CANCELLED_REASON: &str = "cancelled";

/// Causes printed by [`AppError::detailed_message`] before truncating
const MAX_CAUSE_DEPTH: usize = 5;

/// Severity used when an error reaches the HTTP edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Caller mistakes: bad ids, bad sizes
    Debug,
    Warn,
    /// Anything the operator should look at
    Error,
}

/// Client-facing presentation of an error
pub trait ErrorMetadata {
    fn http_status_code(&self) -> u16;

    /// Stable machine code, e.g. `NOT_FOUND`
    fn error_code(&self) -> &'static str;

    /// Retrying the same request may succeed
    fn is_recoverable(&self) -> bool;

    fn suggested_action(&self) -> Option<&'static str>;

    /// Message safe to return to the caller
    fn client_message(&self) -> String;

    /// Internal details must not leave the process
    fn is_sensitive(&self) -> bool;

    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O failure: {0}")]
    IoFailure(#[source] io::Error),

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Step {step} failed: {source}")]
    StepFailure {
        step: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias used across the workspace
pub type AppResult<T> = Result<T, AppError>;

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::IoFailure(err)
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("Malformed upload id: {}", err))
    }
}

/// How one variant is rendered at the HTTP edge
#[derive(Debug, Clone, Copy)]
pub struct Presentation {
    pub status: u16,
    pub code: &'static str,
    pub recoverable: bool,
    pub action: Option<&'static str>,
    pub sensitive: bool,
    pub level: LogLevel,
}

const RETRY_LATER: Option<&str> = Some("Retry after a short delay");

const NOT_FOUND: Presentation = Presentation {
    status: 404,
    code: "NOT_FOUND",
    recoverable: false,
    action: Some("Verify the upload ID exists"),
    sensitive: false,
    level: LogLevel::Debug,
};

const INVALID_INPUT: Presentation = Presentation {
    status: 400,
    code: "INVALID_INPUT",
    recoverable: false,
    action: Some("Fix the request and send it again"),
    sensitive: false,
    level: LogLevel::Debug,
};

const IO_FAILURE: Presentation = Presentation {
    status: 500,
    code: "IO_FAILURE",
    recoverable: true,
    action: Some("Retry the upload"),
    sensitive: true,
    level: LogLevel::Error,
};

const UNKNOWN_WORKFLOW: Presentation = Presentation {
    status: 500,
    code: "UNKNOWN_WORKFLOW",
    recoverable: false,
    action: None,
    sensitive: true,
    level: LogLevel::Error,
};

const STEP_FAILURE: Presentation = Presentation {
    status: 500,
    code: "STEP_FAILURE",
    recoverable: false,
    action: Some("Inspect the workflow status for the failing step"),
    sensitive: false,
    level: LogLevel::Warn,
};

const CANCELLED: Presentation = Presentation {
    status: 499,
    code: "CANCELLED",
    recoverable: true,
    action: Some("Retry the request"),
    sensitive: false,
    level: LogLevel::Debug,
};

const DATABASE: Presentation = Presentation {
    status: 500,
    code: "DATABASE_ERROR",
    recoverable: true,
    action: RETRY_LATER,
    sensitive: true,
    level: LogLevel::Error,
};

const STORAGE: Presentation = Presentation {
    status: 500,
    code: "STORAGE_ERROR",
    recoverable: true,
    action: RETRY_LATER,
    sensitive: true,
    level: LogLevel::Error,
};

const INTERNAL: Presentation = Presentation {
    status: 500,
    code: "INTERNAL_ERROR",
    recoverable: true,
    action: RETRY_LATER,
    sensitive: true,
    level: LogLevel::Error,
};

impl AppError {
    /// Wrap an error raised by a workflow step, keeping the step identity.
    pub fn step_failure(step: impl Into<String>, source: AppError) -> Self {
        AppError::StepFailure {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// True when the error (or the step failure it wraps) came from a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            AppError::Cancelled(_) => true,
            AppError::StepFailure { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn presentation(&self) -> Presentation {
        match self {
            AppError::NotFound(_) => NOT_FOUND,
            AppError::InvalidInput(_) => INVALID_INPUT,
            AppError::IoFailure(_) => IO_FAILURE,
            AppError::UnknownWorkflow(_) => UNKNOWN_WORKFLOW,
            AppError::StepFailure { .. } => STEP_FAILURE,
            AppError::Cancelled(_) => CANCELLED,
            AppError::Database(_) => DATABASE,
            AppError::Storage(_) => STORAGE,
            AppError::Internal(_) => INTERNAL,
        }
    }

    /// Variant name, reported as `error_type` outside production
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NotFound",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::IoFailure(_) => "IOFailure",
            AppError::UnknownWorkflow(_) => "UnknownWorkflow",
            AppError::StepFailure { .. } => "StepFailure",
            AppError::Cancelled(_) => "Cancelled",
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::Internal(_) => "Internal",
        }
    }

    /// The error followed by its cause chain, one `Caused by:` line per level.
    pub fn detailed_message(&self) -> String {
        let mut out = self.to_string();
        let mut cause = self.source();
        let mut depth = 0;

        while let Some(err) = cause {
            if depth == MAX_CAUSE_DEPTH {
                out.push_str("\n  ... (truncated)");
                break;
            }
            out.push_str("\n  Caused by: ");
            out.push_str(&err.to_string());
            cause = err.source();
            depth += 1;
        }
        out
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        self.presentation().status
    }

    fn error_code(&self) -> &'static str {
        self.presentation().code
    }

    fn is_recoverable(&self) -> bool {
        self.presentation().recoverable
    }

    fn suggested_action(&self) -> Option<&'static str> {
        self.presentation().action
    }

    fn is_sensitive(&self) -> bool {
        self.presentation().sensitive
    }

    fn log_level(&self) -> LogLevel {
        self.presentation().level
    }

    fn client_message(&self) -> String {
        match self {
            AppError::NotFound(msg) | AppError::InvalidInput(msg) | AppError::Cancelled(msg) => {
                msg.clone()
            }
            AppError::IoFailure(_) => "Failed to read or write upload data".to_string(),
            AppError::StepFailure { step, .. } => format!("Workflow step {} failed", step),
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::UnknownWorkflow(_) | AppError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_upload_presentation() {
        let err = AppError::NotFound("Upload 42 not found".to_string());
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert!(!err.is_recoverable());
        assert!(!err.is_sensitive());
        assert_eq!(err.client_message(), "Upload 42 not found");
        assert_eq!(err.log_level(), LogLevel::Debug);
    }

    #[cfg(feature = "sqlx")]
    #[test]
    fn test_database_errors_are_hidden_and_retryable() {
        let err = AppError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert_eq!(err.http_status_code(), 500);
        assert!(err.is_recoverable());
        assert!(err.is_sensitive());
        assert_eq!(err.client_message(), "Failed to access database");
    }

    #[test]
    fn test_io_error_maps_to_io_failure() {
        let err = AppError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
        assert_eq!(err.error_type(), "IOFailure");
        assert_eq!(err.error_code(), "IO_FAILURE");
    }

    #[test]
    fn test_step_failure_keeps_cause_chain() {
        let err = AppError::step_failure(
            "intake.store",
            AppError::Storage("disk full".to_string()),
        );
        assert_eq!(err.error_type(), "StepFailure");
        assert!(err.to_string().contains("intake.store"));
        assert!(err.detailed_message().contains("Caused by: Storage error: disk full"));
        assert_eq!(err.client_message(), "Workflow step intake.store failed");
    }

    #[test]
    fn test_cancelled_detected_through_step_failure() {
        let err = AppError::step_failure("intake.scan", AppError::Cancelled(CANCELLED_REASON.into()));
        assert!(err.is_cancelled());
        assert!(!AppError::Internal("boom".into()).is_cancelled());
    }

    #[test]
    fn test_malformed_uuid_is_invalid_input() {
        let err = AppError::from(uuid::Uuid::parse_str("nope").unwrap_err());
        assert_eq!(err.http_status_code(), 400);
    }
}
