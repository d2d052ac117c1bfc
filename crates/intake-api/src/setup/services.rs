//! Pipeline wiring: scanner, storage areas, workflow registry, orchestrator
//! and the upload protocol

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use intake_core::IntakeConfig;
use intake_db::{UploadRequestRepository, WorkflowExecutionRepository, WorkflowStateStore};
#[cfg(feature = "clamav")]
use intake_services::ClamAVScanner;
use intake_services::{ContentScanner, NoOpScanner};
use intake_protocol::{build_upload_workflow, IntakeProtocol, UploadTracker};
use intake_storage::{ObjectStorage, PermanentStore, StagingArea};
use intake_worker::{Orchestrator, WorkflowRegistry};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

pub async fn initialize_services(
    config: &IntakeConfig,
    pool: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
) -> Result<Arc<AppState>> {
    let shutdown = CancellationToken::new();
    let scanner = setup_scanner(config);

    let staging = StagingArea::new(storage.clone());
    let permanent = PermanentStore::new(storage.clone());

    let mut registry = WorkflowRegistry::new();
    registry
        .register(build_upload_workflow(staging.clone(), permanent, scanner)?)
        .context("Failed to register upload workflow")?;

    let workflows: Arc<dyn WorkflowStateStore> =
        Arc::new(WorkflowExecutionRepository::new(pool.clone()));
    let orchestrator = Arc::new(Orchestrator::new(registry, workflows));

    let reconciled = orchestrator
        .reconcile_interrupted()
        .await
        .context("Failed to reconcile interrupted workflows")?;
    if reconciled > 0 {
        tracing::warn!(count = reconciled, "Closed workflows interrupted by a previous shutdown");
    }

    let tracker = Arc::new(UploadTracker::new());
    spawn_tracker_sweeper(
        tracker.clone(),
        config.tracker_retention(),
        config.tracker_sweep_interval(),
        shutdown.clone(),
    );

    let protocol = Arc::new(IntakeProtocol::new(
        tracker,
        staging,
        Arc::new(UploadRequestRepository::new(pool.clone())),
        orchestrator,
        config.max_upload_size_bytes,
        shutdown.clone(),
    ));

    tracing::info!(
        max_upload_size_bytes = config.max_upload_size_bytes,
        "Upload pipeline initialized"
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        pool,
        storage,
        protocol,
        shutdown,
    }))
}

fn setup_scanner(config: &IntakeConfig) -> Arc<dyn ContentScanner> {
    #[cfg(feature = "clamav")]
    {
        if config.scan.clamav_enabled {
            tracing::info!(
                host = %config.scan.clamav_host,
                port = config.scan.clamav_port,
                fail_closed = config.scan.clamav_fail_closed,
                "ClamAV scanning enabled"
            );
            return Arc::new(ClamAVScanner::from_config(&config.scan));
        }
    }

    if config.scan.clamav_enabled {
        tracing::warn!("ClamAV requested but the clamav feature is not enabled; scans are skipped");
    } else {
        tracing::info!("Content scanning disabled, using no-op scanner");
    }
    Arc::new(NoOpScanner)
}

/// Periodically evict tracker entries older than `retention`.
pub fn spawn_tracker_sweeper(
    tracker: Arc<UploadTracker>,
    retention: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Tracker sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = tracker.evict_stale(retention);
                    if evicted > 0 {
                        tracing::debug!(evicted, remaining = tracker.len(), "Evicted stale upload tracker entries");
                    }
                }
            }
        }
    })
}
