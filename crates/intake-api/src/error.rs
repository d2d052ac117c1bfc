//! Rendering of [`AppError`] as JSON error responses
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`; the body is
//! built from the error's [`ErrorMetadata`]. Cause chains and variant names
//! are attached outside production unless the error is sensitive.

use std::sync::OnceLock;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use intake_core::{AppError, ErrorMetadata, LogLevel};
use intake_storage::StorageError;
use serde::Serialize;

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl ErrorResponse {
    fn from_error(err: &AppError, with_details: bool) -> Self {
        Self {
            error: err.client_message(),
            code: err.error_code().to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action().map(str::to_string),
            details: with_details.then(|| err.detailed_message()),
            error_type: with_details.then(|| err.error_type().to_string()),
        }
    }
}

#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(err.into())
    }
}

/// Read once: `ENVIRONMENT` (or `APP_ENV`) set to `production`/`prod`.
fn running_in_production() -> bool {
    static PRODUCTION: OnceLock<bool> = OnceLock::new();
    *PRODUCTION.get_or_init(|| {
        let env = std::env::var("ENVIRONMENT")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_default()
            .to_lowercase();
        env == "production" || env == "prod"
    })
}

fn trace_error(err: &AppError, status: StatusCode) {
    let kind = err.error_type();
    let status = status.as_u16();
    match err.log_level() {
        LogLevel::Debug => tracing::debug!(error = %err, error_type = kind, status, "Request failed"),
        LogLevel::Warn => tracing::warn!(error = %err, error_type = kind, status, "Request failed"),
        LogLevel::Error => tracing::error!(
            error = %err.detailed_message(),
            error_type = kind,
            status,
            "Request failed"
        ),
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = StatusCode::from_u16(err.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        trace_error(&err, status);

        let with_details = !running_in_production() && !err.is_sensitive();
        (status, Json(ErrorResponse::from_error(&err, with_details))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_object_becomes_not_found() {
        let HttpAppError(err) = StorageError::NotFound("staging/x".to_string()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_backend_failure_becomes_storage_error() {
        let HttpAppError(err) = StorageError::UploadFailed("bucket gone".to_string()).into();
        match err {
            AppError::Storage(msg) => assert!(msg.contains("bucket gone")),
            other => panic!("Expected Storage variant, got {:?}", other),
        }
    }

    #[test]
    fn test_status_codes() {
        let not_found = HttpAppError(AppError::NotFound("Upload x".to_string())).into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let invalid = HttpAppError(AppError::InvalidInput("bad".to_string())).into_response();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let internal = HttpAppError(AppError::Internal("boom".to_string())).into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_body_shape_with_and_without_details() {
        let err = AppError::NotFound("Upload x".to_string());

        let json = serde_json::to_value(ErrorResponse::from_error(&err, true)).unwrap();
        assert_eq!(json["error"], "Upload x");
        assert_eq!(json["code"], "NOT_FOUND");
        assert_eq!(json["recoverable"], false);
        assert!(json.get("details").is_some());
        assert_eq!(json["error_type"], "NotFound");

        let json = serde_json::to_value(ErrorResponse::from_error(&err, false)).unwrap();
        assert!(json.get("details").is_none());
        assert!(json.get("error_type").is_none());
        assert!(json.get("suggested_action").is_some());
    }
}
