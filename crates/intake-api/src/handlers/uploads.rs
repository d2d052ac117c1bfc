//! Upload submission and status handlers

use crate::constants::UPLOAD_SIZE_HEADER;
use crate::error::HttpAppError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use intake_core::models::UploadId;
use intake_core::{AppError, AppResult};
use intake_protocol::UploadStatusView;
use intake_storage::ObjectReader;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CreateUploadResponse {
    pub id: UploadId,
    /// Base58-encoded multihash of the content
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct UploadStateBody {
    pub id: UploadId,
    pub size: u64,
    pub uploaded: u64,
    pub started: DateTime<Utc>,
    pub completed: bool,
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct UploadStatusResponse {
    pub state: UploadStateBody,
}

impl From<UploadStatusView> for UploadStatusResponse {
    fn from(view: UploadStatusView) -> Self {
        Self {
            state: UploadStateBody {
                id: view.id,
                size: view.size,
                uploaded: view.uploaded_bytes,
                started: view.started_at,
                completed: view.completed,
                hash: view.hash.to_base58(),
            },
        }
    }
}

/// Declared size from `X-Upload-Size`, falling back to `Content-Length`.
fn declared_size(headers: &HeaderMap) -> AppResult<u64> {
    let value = headers
        .get(UPLOAD_SIZE_HEADER)
        .or_else(|| headers.get(header::CONTENT_LENGTH))
        .ok_or_else(|| {
            AppError::InvalidInput(
                "Missing X-Upload-Size or Content-Length header".to_string(),
            )
        })?;
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| AppError::InvalidInput("Declared upload size is not a number".to_string()))
}

fn parse_upload_id(raw: &str) -> AppResult<UploadId> {
    Ok(Uuid::parse_str(raw)?)
}

/// Accept a raw upload body and start the ingestion pipeline.
pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, HttpAppError> {
    let declared_size = declared_size(&headers)?;
    let reader: ObjectReader = Box::pin(StreamReader::new(
        body.into_data_stream().map_err(io::Error::other),
    ));

    // The transfer runs on its own task so cleanup completes even if the
    // client disconnects; dropping this handler cancels it.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let protocol = state.protocol.clone();
    let receipt = tokio::spawn(async move {
        protocol
            .handle_upload(reader, declared_size, &cancel)
            .await
    })
    .await
    .map_err(|e| AppError::Internal(format!("Upload task failed: {}", e)))??;
    guard.disarm();

    Ok((
        StatusCode::CREATED,
        Json(CreateUploadResponse {
            id: receipt.id,
            hash: receipt.hash.to_base58(),
        }),
    ))
}

pub async fn get_upload_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let id = parse_upload_id(&id)?;
    let view = state
        .protocol
        .query_upload_status(id, &state.shutdown)
        .await?;
    Ok(Json(UploadStatusResponse::from(view)))
}

/// Per-step statuses of the upload's workflow, including the scan outcome.
pub async fn get_upload_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let id = parse_upload_id(&id)?;
    let status = state.protocol.workflow_status(id, &state.shutdown).await?;
    Ok(Json(status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_declared_size_prefers_upload_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        headers.insert(UPLOAD_SIZE_HEADER, HeaderValue::from_static("12"));
        assert_eq!(declared_size(&headers).unwrap(), 12);
    }

    #[test]
    fn test_declared_size_falls_back_to_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert_eq!(declared_size(&headers).unwrap(), 10);
    }

    #[test]
    fn test_declared_size_missing_or_invalid() {
        assert!(matches!(
            declared_size(&HeaderMap::new()),
            Err(AppError::InvalidInput(_))
        ));
        let mut headers = HeaderMap::new();
        headers.insert(UPLOAD_SIZE_HEADER, HeaderValue::from_static("lots"));
        assert!(matches!(
            declared_size(&headers),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_malformed_id_is_invalid_input() {
        assert!(matches!(
            parse_upload_id("not-a-uuid"),
            Err(AppError::InvalidInput(_))
        ));
    }
}
