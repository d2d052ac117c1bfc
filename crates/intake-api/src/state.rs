//! Application state shared by all handlers

use std::sync::Arc;

use intake_core::IntakeConfig;
use intake_protocol::IntakeProtocol;
use intake_storage::ObjectStorage;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: IntakeConfig,
    pub pool: SqlitePool,
    pub storage: Arc<dyn ObjectStorage>,
    pub protocol: Arc<IntakeProtocol>,
    /// Cancelled on shutdown; parent of every running pipeline
    pub shutdown: CancellationToken,
}
