//! Database setup and initialization

use anyhow::{Context, Result};
use intake_core::IntakeConfig;
use sqlx::SqlitePool;

/// Open the connection pool and apply embedded migrations
pub async fn setup_database(config: &IntakeConfig) -> Result<SqlitePool> {
    tracing::info!("Connecting to database...");
    let pool = intake_db::connect(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connected successfully"
    );

    intake_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
