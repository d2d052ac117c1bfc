//! Storage setup and initialization

use anyhow::{Context, Result};
use intake_core::IntakeConfig;
use intake_storage::{create_storage, ObjectStorage};
use std::sync::Arc;

pub async fn setup_storage(config: &IntakeConfig) -> Result<Arc<dyn ObjectStorage>> {
    tracing::info!("Initializing storage...");
    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    tracing::info!(
        backend = %storage.backend_type(),
        "Storage initialized successfully"
    );
    Ok(storage)
}
