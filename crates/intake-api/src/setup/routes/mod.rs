//! Route configuration and setup.
//!
//! Upload routes live under the versioned API prefix; health checks in [health](health).

mod health;

use crate::constants::API_PREFIX;
use crate::handlers::uploads;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use intake_core::IntakeConfig;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &IntakeConfig, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let upload_routes = Router::new()
        .route("/uploads", post(uploads::create_upload))
        .route("/uploads/{id}/status", get(uploads::get_upload_status))
        .route("/uploads/{id}/workflow", get(uploads::get_upload_workflow));

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
        .max(1);
    tracing::info!(
        http_concurrency_limit = http_concurrency_limit,
        "HTTP concurrency limit layer enabled"
    );

    let body_limit = usize::try_from(config.max_upload_size_bytes).unwrap_or(usize::MAX);

    let app = Router::new()
        .route("/health", get(health::health_check))
        .nest(API_PREFIX, upload_routes)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}
