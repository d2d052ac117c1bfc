//! Application setup and initialization
//!
//! Everything `main` needs before the listener starts: config validation,
//! telemetry, database, storage, the upload pipeline and the router.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use intake_core::IntakeConfig;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: IntakeConfig) -> Result<(Arc<AppState>, axum::Router)> {
    // Validate configuration first - fail fast on misconfiguration
    config
        .validate()
        .context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(config.log_format);
    tracing::info!(
        environment = %config.environment,
        storage_backend = %config.storage_backend,
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;
    let storage = storage::setup_storage(&config).await?;
    let state = services::initialize_services(&config, pool, storage).await?;
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
