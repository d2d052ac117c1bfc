//! Workflow execution repository
//!
//! Step transitions are compare-and-set updates: a row only moves if it is
//! still in the expected status, so a step can never be run or resolved twice.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use intake_core::models::{FailureBehavior, PipelineStatus, StepRecord, StepStatus, WorkflowStatus};
use intake_core::{AppError, AppResult};

/// Step to create alongside a new execution
#[derive(Debug, Clone, Copy)]
pub struct NewStep<'a> {
    pub name: &'a str,
    pub failure_behavior: FailureBehavior,
}

/// Persistence of workflow executions, keyed by request id
#[async_trait]
pub trait WorkflowStateStore: Send + Sync {
    /// Create an execution in `Running` with every step `Pending`; returns its start time.
    async fn create_execution(
        &self,
        request_id: Uuid,
        workflow: &str,
        steps: &[NewStep<'_>],
    ) -> AppResult<DateTime<Utc>>;

    /// Move step `position` from `from` to `to`, recording the handler message or error.
    async fn transition_step(
        &self,
        request_id: Uuid,
        position: u32,
        from: StepStatus,
        to: StepStatus,
        message: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()>;

    /// Record the terminal pipeline status
    async fn finish_execution(&self, request_id: Uuid, status: PipelineStatus) -> AppResult<()>;

    async fn load_status(&self, request_id: Uuid) -> AppResult<Option<WorkflowStatus>>;

    /// Request ids of executions that have not reached a terminal status
    async fn list_unfinished(&self) -> AppResult<Vec<Uuid>>;
}

#[derive(Debug, FromRow)]
struct ExecutionRow {
    request_id: Uuid,
    workflow: String,
    status: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct StepRow {
    position: i64,
    name: String,
    failure_behavior: String,
    status: String,
    message: Option<String>,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<StepRow> for StepRecord {
    type Error = AppError;

    fn try_from(row: StepRow) -> Result<Self, Self::Error> {
        Ok(StepRecord {
            position: u32::try_from(row.position).map_err(|_| {
                AppError::Internal(format!("Invalid step position {}", row.position))
            })?,
            name: row.name,
            failure_behavior: row.failure_behavior.parse()?,
            status: row.status.parse()?,
            message: row.message,
            error: row.error,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

#[derive(Clone)]
pub struct WorkflowExecutionRepository {
    pool: SqlitePool,
}

impl WorkflowExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowStateStore for WorkflowExecutionRepository {
    async fn create_execution(
        &self,
        request_id: Uuid,
        workflow: &str,
        steps: &[NewStep<'_>],
    ) -> AppResult<DateTime<Utc>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions (request_id, workflow, status, started_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(request_id)
        .bind(workflow)
        .bind(PipelineStatus::Running.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::InvalidInput(
                format!("Request {} already has a workflow execution", request_id),
            ),
            other => AppError::from(other),
        })?;

        for (position, step) in steps.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO workflow_steps (request_id, position, name, failure_behavior, status)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(request_id)
            .bind(position as i64)
            .bind(step.name)
            .bind(step.failure_behavior.as_str())
            .bind(StepStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(now)
    }

    async fn transition_step(
        &self,
        request_id: Uuid,
        position: u32,
        from: StepStatus,
        to: StepStatus,
        message: Option<&str>,
        error: Option<&str>,
    ) -> AppResult<()> {
        if !from.can_transition_to(to) {
            return Err(AppError::Internal(format!(
                "Illegal step transition {} -> {} for request {} step {}",
                from, to, request_id, position
            )));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE workflow_steps
            SET status = $1,
                message = COALESCE($2, message),
                error = COALESCE($3, error),
                started_at = CASE WHEN $1 = 'running' THEN $4 ELSE started_at END,
                finished_at = CASE WHEN $1 IN ('succeeded', 'failed') THEN $4 ELSE finished_at END
            WHERE request_id = $5 AND position = $6 AND status = $7
            "#,
        )
        .bind(to.as_str())
        .bind(message)
        .bind(error)
        .bind(now)
        .bind(request_id)
        .bind(position as i64)
        .bind(from.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!(
                "Step {} of request {} is not {}; refusing transition to {}",
                position, request_id, from, to
            )));
        }

        sqlx::query(r#"UPDATE workflow_executions SET updated_at = $1 WHERE request_id = $2"#)
            .bind(now)
            .bind(request_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn finish_execution(&self, request_id: Uuid, status: PipelineStatus) -> AppResult<()> {
        if !status.is_terminal() {
            return Err(AppError::Internal(format!(
                "Cannot finish request {} with non-terminal status {}",
                request_id, status
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET status = $1, finished_at = $2, updated_at = $2
            WHERE request_id = $3 AND status IN ('pending', 'running')
            "#,
        )
        .bind(status.as_str())
        .bind(now)
        .bind(request_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Internal(format!(
                "Workflow execution for request {} is missing or already finished",
                request_id
            )));
        }

        Ok(())
    }

    async fn load_status(&self, request_id: Uuid) -> AppResult<Option<WorkflowStatus>> {
        let execution = sqlx::query_as::<Sqlite, ExecutionRow>(
            r#"
            SELECT request_id, workflow, status, started_at, finished_at
            FROM workflow_executions
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(execution) = execution else {
            return Ok(None);
        };

        let steps = sqlx::query_as::<Sqlite, StepRow>(
            r#"
            SELECT position, name, failure_behavior, status, message, error, started_at, finished_at
            FROM workflow_steps
            WHERE request_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StepRecord::try_from)
        .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(WorkflowStatus {
            request_id: execution.request_id,
            workflow: execution.workflow,
            overall: execution.status.parse()?,
            started_at: execution.started_at,
            finished_at: execution.finished_at,
            steps,
        }))
    }

    async fn list_unfinished(&self) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<Sqlite, Uuid>(
            r#"
            SELECT request_id
            FROM workflow_executions
            WHERE status IN ('pending', 'running')
            ORDER BY started_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}
