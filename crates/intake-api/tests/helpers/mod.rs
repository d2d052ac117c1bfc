//! Test helpers: build the application against a scratch directory.
//!
//! Each test app gets its own SQLite file and local storage root, so tests run
//! in parallel without Docker or external services.

use axum_test::TestServer;
use intake_api::constants;
use intake_api::setup::{database, routes, services, storage};
use intake_api::AppState;
use intake_core::{IntakeConfig, LogFormat, ScanConfig, StorageBackend};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server, state, and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }
}

pub fn create_test_config(temp_dir: &TempDir) -> IntakeConfig {
    IntakeConfig {
        server_port: 0,
        environment: "test".to_string(),
        log_format: LogFormat::Pretty,
        database_url: format!(
            "sqlite://{}?mode=rwc",
            temp_dir.path().join("intake.db").display()
        ),
        db_max_connections: 4,
        storage_backend: StorageBackend::Local,
        local_storage_path: Some(temp_dir.path().join("data").display().to_string()),
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        max_upload_size_bytes: 1024 * 1024,
        scan: ScanConfig {
            clamav_enabled: false,
            clamav_host: "localhost".to_string(),
            clamav_port: 3310,
            clamav_fail_closed: false,
            clamav_timeout_secs: 5,
            max_scan_size_bytes: 1024 * 1024,
        },
        tracker_retention_secs: 3600,
        tracker_sweep_interval_secs: 60,
    }
}

/// Setup test app with an isolated database and local storage.
pub async fn setup_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let config = create_test_config(&temp_dir);
    config.validate().expect("Test config must be valid");

    let pool = database::setup_database(&config)
        .await
        .expect("Failed to set up database");
    let storage = storage::setup_storage(&config)
        .await
        .expect("Failed to set up storage");
    let state = services::initialize_services(&config, pool, storage)
        .await
        .expect("Failed to initialize services");
    let app = routes::setup_routes(&config, state.clone()).expect("Failed to build routes");

    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        _temp_dir: temp_dir,
    }
}

/// Poll the status endpoint until the upload reports completion.
pub async fn wait_for_completion(client: &TestServer, id: &str) -> serde_json::Value {
    for _ in 0..100 {
        let response = client
            .get(&api_path(&format!("/uploads/{}/status", id)))
            .await;
        assert_eq!(response.status_code(), 200);
        let body: serde_json::Value = response.json();
        if body["state"]["completed"].as_bool() == Some(true) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Upload {} did not complete", id);
}
