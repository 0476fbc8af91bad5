//! Durable job queue repository (C5): `SELECT ... FOR UPDATE SKIP LOCKED`
//! claim, lease-based visibility, retry bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollout_core::id::ResourceId;
use rollout_core::job::{Job, JobStatus};
use sqlx::PgPool;

use crate::codec::{enum_to_text, text_to_enum};
use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: uuid::Uuid,
    execution_id: uuid::Uuid,
    status: String,
    payload: serde_json::Value,
    priority: i32,
    retry_count: i32,
    max_retries: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    processing_instance: Option<String>,
}

fn row_to_job(row: JobRow) -> DbResult<Job> {
    Ok(Job {
        id: ResourceId::from_uuid(row.id),
        deployment_execution_id: ResourceId::from_uuid(row.execution_id),
        status: text_to_enum::<JobStatus>(&row.status)?,
        payload: row.payload,
        created_at: row.created_at,
        started_at: row.started_at,
        ended_at: row.ended_at,
        error_message: row.error_message,
        retry_count: row.retry_count as u32,
        max_retries: row.max_retries as u32,
        next_retry_at: row.next_retry_at,
        locked_until: row.locked_until,
        processing_instance: row.processing_instance,
        priority: row.priority,
    })
}

#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn enqueue(&self, job: &Job) -> DbResult<()>;
    async fn get(&self, id: ResourceId) -> DbResult<Job>;
    /// Claim the next eligible job: pending, or retryable-and-due, whose
    /// lease (if any) has expired. Visibility timeout is `lease`.
    async fn claim(&self, worker_id: &str, lease: chrono::Duration) -> DbResult<Option<Job>>;
    async fn complete(&self, id: ResourceId) -> DbResult<()>;
    async fn fail(
        &self,
        id: ResourceId,
        error: &str,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> DbResult<()>;
    async fn cancel(&self, id: ResourceId) -> DbResult<()>;
    /// Cancel the (unique, per the `jobs.execution_id` constraint) job
    /// backing a deployment execution, when the caller only has the
    /// execution id at hand (e.g. the facade's CancelDeployment handler).
    async fn cancel_for_execution(&self, execution_id: ResourceId) -> DbResult<()>;
    /// Release leases that expired without the worker completing or failing
    /// the job, so another worker can reclaim it.
    async fn sweep_expired_leases(&self) -> DbResult<u64>;
}

pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn enqueue(&self, job: &Job) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, execution_id, status, payload, priority, retry_count, max_retries,
                               error_message, created_at, started_at, ended_at, next_retry_at,
                               locked_until, processing_instance)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.deployment_execution_id.as_uuid())
        .bind(enum_to_text(&job.status)?)
        .bind(&job.payload)
        .bind(job.priority)
        .bind(job.retry_count as i32)
        .bind(job.max_retries as i32)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.ended_at)
        .bind(job.next_retry_at)
        .bind(job.locked_until)
        .bind(&job.processing_instance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> DbResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {id}")))?;
        row_to_job(row)
    }

    async fn claim(&self, worker_id: &str, lease: chrono::Duration) -> DbResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = COALESCE(started_at, NOW()),
                locked_until = NOW() + $2::interval, processing_instance = $1
            WHERE id = (
                SELECT id FROM jobs
                WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW()))
                   OR (status = 'running' AND locked_until < NOW())
                ORDER BY priority DESC, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(format!("{} seconds", lease.num_seconds()))
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_job).transpose()
    }

    async fn complete(&self, id: ResourceId) -> DbResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'succeeded', ended_at = NOW(), locked_until = NULL WHERE id = $1",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(
        &self,
        id: ResourceId,
        error: &str,
        retry_count: u32,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let status = if next_retry_at.is_some() {
            "pending"
        } else {
            "failed"
        };
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, error_message = $3, retry_count = $4, next_retry_at = $5,
                locked_until = NULL, ended_at = CASE WHEN $2 = 'failed' THEN NOW() ELSE NULL END
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status)
        .bind(error)
        .bind(retry_count as i32)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, id: ResourceId) -> DbResult<()> {
        sqlx::query("UPDATE jobs SET status = 'cancelled', ended_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cancel_for_execution(&self, execution_id: ResourceId) -> DbResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'cancelled', ended_at = NOW()
             WHERE execution_id = $1 AND status IN ('pending', 'running')",
        )
        .bind(execution_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sweep_expired_leases(&self) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'pending', locked_until = NULL, processing_instance = NULL
             WHERE status = 'running' AND locked_until < NOW()",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
