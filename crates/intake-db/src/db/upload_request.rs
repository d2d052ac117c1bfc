//! Upload request repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use intake_core::models::{ContentHash, UploadId, UploadRecord};
use intake_core::{AppError, AppResult};

/// Durable store of upload requests
#[async_trait]
pub trait UploadRequestStore: Send + Sync {
    /// Record a new request. An id that already exists is `InvalidInput`.
    async fn create_request(
        &self,
        id: UploadId,
        protocol: &str,
        hash: &ContentHash,
        size: u64,
    ) -> AppResult<UploadRecord>;

    async fn get_request(&self, id: UploadId) -> AppResult<Option<UploadRecord>>;
}

#[derive(Debug, FromRow)]
struct UploadRequestRow {
    id: Uuid,
    protocol: String,
    hash: Vec<u8>,
    declared_size: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<UploadRequestRow> for UploadRecord {
    type Error = AppError;

    fn try_from(row: UploadRequestRow) -> Result<Self, Self::Error> {
        let declared_size = u64::try_from(row.declared_size).map_err(|_| {
            AppError::Internal(format!(
                "Upload request {} has negative size {}",
                row.id, row.declared_size
            ))
        })?;
        let content_hash = ContentHash::from_multihash_bytes(&row.hash, declared_size)?;
        Ok(UploadRecord {
            id: row.id,
            protocol: row.protocol,
            declared_size,
            content_hash,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct UploadRequestRepository {
    pool: SqlitePool,
}

impl UploadRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadRequestStore for UploadRequestRepository {
    async fn create_request(
        &self,
        id: UploadId,
        protocol: &str,
        hash: &ContentHash,
        size: u64,
    ) -> AppResult<UploadRecord> {
        let declared_size = i64::try_from(size)
            .map_err(|_| AppError::InvalidInput(format!("Upload size {} is too large", size)))?;
        let now = Utc::now();

        let row = sqlx::query_as::<Sqlite, UploadRequestRow>(
            r#"
            INSERT INTO upload_requests (id, protocol, hash, declared_size, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, protocol, hash, declared_size, created_at
            "#,
        )
        .bind(id)
        .bind(protocol)
        .bind(hash.to_multihash_bytes())
        .bind(declared_size)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::InvalidInput(format!("Upload request {} already exists", id))
            }
            other => AppError::from(other),
        })?;

        tracing::debug!(request_id = %id, protocol = %protocol, size_bytes = size, "Upload request created");

        row.try_into()
    }

    async fn get_request(&self, id: UploadId) -> AppResult<Option<UploadRecord>> {
        let row = sqlx::query_as::<Sqlite, UploadRequestRow>(
            r#"
            SELECT id, protocol, hash, declared_size, created_at
            FROM upload_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadRecord::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::{connect, run_migrations};

    async fn repository() -> UploadRequestRepository {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        UploadRequestRepository::new(pool)
    }

    fn hash(size: u64) -> ContentHash {
        ContentHash::sha2_256(vec![0xab; 32], size).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_request() {
        let repo = repository().await;
        let id = Uuid::new_v4();

        let created = repo.create_request(id, "upload", &hash(42), 42).await.unwrap();
        assert_eq!(created.id, id);
        assert_eq!(created.declared_size, 42);

        let fetched = repo.get_request(id).await.unwrap().unwrap();
        assert_eq!(fetched.protocol, "upload");
        assert_eq!(fetched.content_hash, hash(42));
        assert_eq!(fetched.created_at, created.created_at);
    }

    #[tokio::test]
    async fn test_get_missing_request() {
        let repo = repository().await;
        assert!(repo.get_request(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_request_rejected() {
        let repo = repository().await;
        let id = Uuid::new_v4();
        repo.create_request(id, "upload", &hash(1), 1).await.unwrap();

        let err = repo.create_request(id, "upload", &hash(1), 1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_request_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("intake.db").display());
        let id = Uuid::new_v4();

        {
            let pool = connect(&url, 2).await.unwrap();
            run_migrations(&pool).await.unwrap();
            UploadRequestRepository::new(pool.clone())
                .create_request(id, "upload", &hash(7), 7)
                .await
                .unwrap();
            pool.close().await;
        }

        let pool = connect(&url, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let record = UploadRequestRepository::new(pool)
            .get_request(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.declared_size, 7);
    }
}
