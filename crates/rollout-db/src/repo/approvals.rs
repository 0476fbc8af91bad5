//! Approval workflow repository (C7).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollout_core::approval::{ApprovalRequest, ApprovalStatus};
use rollout_core::environment::Environment;
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use sqlx::PgPool;

use crate::codec::{enum_to_text, text_to_enum};
use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct ApprovalRow {
    id: uuid::Uuid,
    execution_id: uuid::Uuid,
    module_name: String,
    version: String,
    environment: String,
    requester_email: String,
    approver_emails: serde_json::Value,
    status: String,
    requested_at: DateTime<Utc>,
    timeout_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
    responded_by_email: Option<String>,
    response_reason: Option<String>,
}

fn row_to_approval(row: ApprovalRow) -> DbResult<ApprovalRequest> {
    let approver_emails: Vec<String> = serde_json::from_value(row.approver_emails)
        .map_err(|e| DbError::Database(sqlx::Error::Decode(Box::new(e))))?;
    Ok(ApprovalRequest {
        id: ResourceId::from_uuid(row.id),
        deployment_execution_id: ResourceId::from_uuid(row.execution_id),
        module_name: row.module_name,
        version: Version::parse(&row.version)
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
        environment: row
            .environment
            .parse::<Environment>()
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
        requester_email: row.requester_email,
        approver_emails,
        status: text_to_enum::<ApprovalStatus>(&row.status)?,
        requested_at: row.requested_at,
        timeout_at: row.timeout_at,
        responded_at: row.responded_at,
        responded_by_email: row.responded_by_email,
        response_reason: row.response_reason,
    })
}

#[async_trait]
pub trait ApprovalRepo: Send + Sync {
    async fn create(&self, request: &ApprovalRequest) -> DbResult<()>;
    async fn get(&self, id: ResourceId) -> DbResult<ApprovalRequest>;
    async fn get_for_execution(&self, execution_id: ResourceId) -> DbResult<Option<ApprovalRequest>>;
    async fn decide(
        &self,
        id: ResourceId,
        status: ApprovalStatus,
        responded_by_email: &str,
        reason: Option<&str>,
    ) -> DbResult<()>;
    /// Expire every approval whose timeout has elapsed with no decision.
    /// Returns the execution ids whose approval just expired.
    async fn expire_overdue(&self) -> DbResult<Vec<ResourceId>>;
}

pub struct PgApprovalRepo {
    pool: PgPool,
}

impl PgApprovalRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalRepo for PgApprovalRepo {
    async fn create(&self, request: &ApprovalRequest) -> DbResult<()> {
        let approver_emails = serde_json::to_value(&request.approver_emails)
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?;
        sqlx::query(
            r#"
            INSERT INTO approval_requests
                (id, execution_id, module_name, version, environment, requester_email,
                 approver_emails, status, requested_at, timeout_at, responded_at,
                 responded_by_email, response_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.deployment_execution_id.as_uuid())
        .bind(&request.module_name)
        .bind(request.version.to_string())
        .bind(request.environment.as_str())
        .bind(&request.requester_email)
        .bind(approver_emails)
        .bind(enum_to_text(&request.status)?)
        .bind(request.requested_at)
        .bind(request.timeout_at)
        .bind(request.responded_at)
        .bind(&request.responded_by_email)
        .bind(&request.response_reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> DbResult<ApprovalRequest> {
        let row = sqlx::query_as::<_, ApprovalRow>("SELECT * FROM approval_requests WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("approval request {id}")))?;
        row_to_approval(row)
    }

    async fn get_for_execution(
        &self,
        execution_id: ResourceId,
    ) -> DbResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            "SELECT * FROM approval_requests WHERE execution_id = $1 ORDER BY requested_at DESC LIMIT 1",
        )
        .bind(execution_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_approval).transpose()
    }

    async fn decide(
        &self,
        id: ResourceId,
        status: ApprovalStatus,
        responded_by_email: &str,
        reason: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE approval_requests
            SET status = $2, responded_at = NOW(), responded_by_email = $3, response_reason = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(enum_to_text(&status)?)
        .bind(responded_by_email)
        .bind(reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn expire_overdue(&self) -> DbResult<Vec<ResourceId>> {
        let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
            r#"
            UPDATE approval_requests
            SET status = 'expired', responded_at = NOW()
            WHERE status = 'pending' AND timeout_at < NOW()
            RETURNING execution_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id,)| ResourceId::from_uuid(id))
            .collect())
    }
}
