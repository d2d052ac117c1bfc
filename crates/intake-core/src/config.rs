//! Configuration module
//!
//! Environment-driven configuration for the intake service: server, database,
//! storage backend, upload limits, content scanning and tracker retention.

use std::env;
use std::time::Duration;

use crate::storage_types::StorageBackend;

// Common constants
const PORT: u16 = 4000;
const MAX_CONNECTIONS: u32 = 5;
const MAX_UPLOAD_SIZE_MB: u64 = 1024;
const CLAMAV_PORT: u16 = 3310;
const CLAMAV_TIMEOUT_SECS: u64 = 30;
const SCAN_MAX_SIZE_MB: u64 = 100;
const TRACKER_RETENTION_SECS: u64 = 3600;
const TRACKER_SWEEP_INTERVAL_SECS: u64 = 60;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Log output format selected with `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Content scanner settings
#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_fail_closed: bool,
    pub clamav_timeout_secs: u64,
    pub max_scan_size_bytes: u64,
}

/// Intake service configuration
#[derive(Clone, Debug)]
pub struct IntakeConfig {
    pub server_port: u16,
    pub environment: String,
    pub log_format: LogFormat,
    pub database_url: String,
    pub db_max_connections: u32,
    // Storage configuration
    pub storage_backend: StorageBackend,
    pub local_storage_path: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>, // S3-compatible providers (MinIO, etc.)
    pub max_upload_size_bytes: u64,
    pub scan: ScanConfig,
    // Upload tracker eviction
    pub tracker_retention_secs: u64,
    pub tracker_sweep_interval_secs: u64,
}

impl IntakeConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";

        let storage_backend = env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<StorageBackend>()?;

        let max_upload_size_mb = env::var("MAX_UPLOAD_SIZE_MB")
            .unwrap_or_else(|_| MAX_UPLOAD_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(MAX_UPLOAD_SIZE_MB);

        let scan_max_size_mb = env::var("SCAN_MAX_SIZE_MB")
            .unwrap_or_else(|_| SCAN_MAX_SIZE_MB.to_string())
            .parse::<u64>()
            .unwrap_or(SCAN_MAX_SIZE_MB);

        let log_format = match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let config = IntakeConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            environment,
            log_format,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://intake.db?mode=rwc".to_string()),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| MAX_CONNECTIONS.to_string())
                .parse()
                .unwrap_or(MAX_CONNECTIONS),
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .ok()
                .or_else(|| Some("./data".to_string())),
            s3_bucket: env::var("S3_BUCKET").ok(),
            s3_region: env::var("S3_REGION").or_else(|_| env::var("AWS_REGION")).ok(),
            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            max_upload_size_bytes: max_upload_size_mb.saturating_mul(BYTES_PER_MB),
            scan: ScanConfig {
                clamav_enabled: env::var("CLAMAV_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .to_lowercase()
                    .parse()
                    .unwrap_or(false),
                clamav_host: env::var("CLAMAV_HOST").unwrap_or_else(|_| "localhost".to_string()),
                clamav_port: env::var("CLAMAV_PORT")
                    .unwrap_or_else(|_| CLAMAV_PORT.to_string())
                    .parse()
                    .unwrap_or(CLAMAV_PORT),
                clamav_fail_closed: env::var("CLAMAV_FAIL_CLOSED")
                    .unwrap_or_else(|_| is_production.to_string())
                    .to_lowercase()
                    .parse()
                    .unwrap_or(is_production),
                clamav_timeout_secs: env::var("CLAMAV_TIMEOUT_SECS")
                    .unwrap_or_else(|_| CLAMAV_TIMEOUT_SECS.to_string())
                    .parse()
                    .unwrap_or(CLAMAV_TIMEOUT_SECS),
                max_scan_size_bytes: scan_max_size_mb.saturating_mul(BYTES_PER_MB),
            },
            tracker_retention_secs: env::var("TRACKER_RETENTION_SECS")
                .unwrap_or_else(|_| TRACKER_RETENTION_SECS.to_string())
                .parse()
                .unwrap_or(TRACKER_RETENTION_SECS),
            tracker_sweep_interval_secs: env::var("TRACKER_SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| TRACKER_SWEEP_INTERVAL_SECS.to_string())
                .parse()
                .unwrap_or(TRACKER_SWEEP_INTERVAL_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn tracker_retention(&self) -> Duration {
        Duration::from_secs(self.tracker_retention_secs)
    }

    pub fn tracker_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.tracker_sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid SQLite connection string"
            ));
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be at least 1"));
        }

        if self.max_upload_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_UPLOAD_SIZE_MB must be greater than 0"));
        }

        if self.tracker_sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!(
                "TRACKER_SWEEP_INTERVAL_SECS must be greater than 0"
            ));
        }

        // Validate storage backend configuration
        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
        }

        if self.scan.clamav_enabled && self.scan.clamav_host.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "CLAMAV_HOST must be set when CLAMAV_ENABLED=true"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> IntakeConfig {
        IntakeConfig {
            server_port: 4000,
            environment: "development".to_string(),
            log_format: LogFormat::Pretty,
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            storage_backend: StorageBackend::Local,
            local_storage_path: Some("/tmp/intake".to_string()),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            max_upload_size_bytes: 10 * BYTES_PER_MB,
            scan: ScanConfig {
                clamav_enabled: false,
                clamav_host: "localhost".to_string(),
                clamav_port: CLAMAV_PORT,
                clamav_fail_closed: false,
                clamav_timeout_secs: CLAMAV_TIMEOUT_SECS,
                max_scan_size_bytes: SCAN_MAX_SIZE_MB * BYTES_PER_MB,
            },
            tracker_retention_secs: TRACKER_RETENTION_SECS,
            tracker_sweep_interval_secs: TRACKER_SWEEP_INTERVAL_SECS,
        }
    }

    #[test]
    fn test_local_config_is_valid() {
        assert!(local_config().validate().is_ok());
    }

    #[test]
    fn test_s3_requires_bucket_and_region() {
        let mut config = local_config();
        config.storage_backend = StorageBackend::S3;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        config.s3_bucket = Some("uploads".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("S3_REGION"));

        config.s3_region = Some("us-east-1".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_sqlite_database_url() {
        let mut config = local_config();
        config.database_url = "postgresql://localhost/intake".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_production() {
        let mut config = local_config();
        assert!(!config.is_production());
        config.environment = "Prod".to_string();
        assert!(config.is_production());
    }
}
