//! Repository for the `DeploymentExecution` aggregate: the execution row plus
//! its append-only stage and per-node-result history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollout_core::environment::Environment;
use rollout_core::execution::{
    DeploymentExecution, ExecutionStatus, NodeResult, NodeResultStatus, Stage, StageName,
    StageStatus,
};
use rollout_core::id::ResourceId;
use rollout_core::module::{ModuleName, Version};
use rollout_core::node::NodeId;
use rollout_core::strategy::StrategyKind;
use sqlx::PgPool;
use std::collections::HashMap;

use crate::codec::{enum_to_text, text_to_enum};
use crate::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct ExecutionRow {
    id: uuid::Uuid,
    module_name: String,
    target_version: String,
    previous_versions: serde_json::Value,
    environment: String,
    strategy: String,
    requester_email: String,
    status: String,
    trace_id: String,
    force: bool,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct StageRow {
    name: String,
    status: String,
    message: Option<String>,
    context: serde_json::Value,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct NodeResultRow {
    node_id: uuid::Uuid,
    from_version: Option<String>,
    to_version: String,
    status: String,
    duration_ms: Option<i64>,
    error: Option<String>,
    retry_count: i32,
    rolled_back: bool,
}

fn row_to_execution(
    row: ExecutionRow,
    stages: Vec<StageRow>,
    node_results: Vec<NodeResultRow>,
) -> DbResult<DeploymentExecution> {
    let previous_versions = match row.previous_versions {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| {
                let node_id = NodeId(ResourceId::from_uuid(
                    k.parse().map_err(|_| DbError::Database(sqlx::Error::Protocol(
                        format!("invalid node id key in previous_versions: {k}"),
                    )))?,
                ));
                let version = serde_json::from_value::<String>(v)
                    .ok()
                    .and_then(|s| Version::parse(&s).ok())
                    .ok_or_else(|| {
                        DbError::Database(sqlx::Error::Protocol(
                            "invalid version in previous_versions".into(),
                        ))
                    })?;
                Ok((node_id, version))
            })
            .collect::<DbResult<HashMap<_, _>>>()?,
        _ => HashMap::new(),
    };

    Ok(DeploymentExecution {
        id: ResourceId::from_uuid(row.id),
        module_name: ModuleName::parse(&row.module_name)
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
        target_version: Version::parse(&row.target_version)
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
        previous_versions,
        environment: row
            .environment
            .parse::<Environment>()
            .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
        strategy: text_to_enum::<StrategyKind>(&row.strategy)?,
        requester_email: row.requester_email,
        created_at: row.created_at,
        started_at: row.started_at,
        ended_at: row.ended_at,
        status: text_to_enum::<ExecutionStatus>(&row.status)?,
        stages: stages
            .into_iter()
            .map(|s| {
                Ok(Stage {
                    name: text_to_enum::<StageName>(&s.name)?,
                    status: text_to_enum::<StageStatus>(&s.status)?,
                    started_at: s.started_at,
                    ended_at: s.ended_at,
                    message: s.message,
                    context: s.context,
                })
            })
            .collect::<DbResult<Vec<_>>>()?,
        node_results: node_results
            .into_iter()
            .map(|r| {
                Ok(NodeResult {
                    node_id: NodeId(ResourceId::from_uuid(r.node_id)),
                    from_version: r
                        .from_version
                        .map(|v| Version::parse(&v))
                        .transpose()
                        .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
                    to_version: Version::parse(&r.to_version)
                        .map_err(|e| DbError::Database(sqlx::Error::Protocol(e.to_string())))?,
                    status: text_to_enum::<NodeResultStatus>(&r.status)?,
                    duration_ms: r.duration_ms.map(|d| d as u64),
                    error: r.error,
                    retry_count: r.retry_count as u32,
                    rolled_back: r.rolled_back,
                })
            })
            .collect::<DbResult<Vec<_>>>()?,
        trace_id: row.trace_id,
        force: row.force,
        metadata: row.metadata,
    })
}

#[async_trait]
pub trait ExecutionRepo: Send + Sync {
    async fn create(&self, execution: &DeploymentExecution) -> DbResult<()>;
    async fn get(&self, id: ResourceId) -> DbResult<DeploymentExecution>;
    async fn list(
        &self,
        module_name: Option<&str>,
        environment: Option<Environment>,
        limit: i64,
    ) -> DbResult<Vec<DeploymentExecution>>;
    async fn list_active_for_lock(
        &self,
        module_name: &str,
        environment: Environment,
    ) -> DbResult<Vec<DeploymentExecution>>;
    async fn set_status(
        &self,
        id: ResourceId,
        status: ExecutionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> DbResult<()>;
    async fn mark_started(&self, id: ResourceId, started_at: DateTime<Utc>) -> DbResult<()>;
    async fn set_previous_versions(
        &self,
        id: ResourceId,
        previous_versions: &HashMap<NodeId, Version>,
    ) -> DbResult<()>;
    async fn append_stage(&self, execution_id: ResourceId, stage: &Stage) -> DbResult<()>;
    async fn upsert_node_result(
        &self,
        execution_id: ResourceId,
        result: &NodeResult,
    ) -> DbResult<()>;
}

pub struct PgExecutionRepo {
    pool: PgPool,
}

impl PgExecutionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_stages(&self, execution_id: uuid::Uuid) -> DbResult<Vec<StageRow>> {
        let rows = sqlx::query_as::<_, StageRow>(
            "SELECT name, status, message, context, started_at, ended_at
             FROM deployment_stages WHERE execution_id = $1 ORDER BY seq ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn load_node_results(&self, execution_id: uuid::Uuid) -> DbResult<Vec<NodeResultRow>> {
        let rows = sqlx::query_as::<_, NodeResultRow>(
            "SELECT node_id, from_version, to_version, status, duration_ms, error, retry_count, rolled_back
             FROM deployment_node_results WHERE execution_id = $1 ORDER BY recorded_at ASC",
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ExecutionRepo for PgExecutionRepo {
    async fn create(&self, execution: &DeploymentExecution) -> DbResult<()> {
        let previous_versions: serde_json::Value = serde_json::Value::Object(
            execution
                .previous_versions
                .iter()
                .map(|(node, version)| (node.0.as_uuid().to_string(), version.to_string().into()))
                .collect(),
        );
        sqlx::query(
            r#"
            INSERT INTO deployment_executions
                (id, module_name, target_version, previous_versions, environment, strategy,
                 requester_email, status, trace_id, force, metadata, created_at, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(execution.id.as_uuid())
        .bind(execution.module_name.as_str())
        .bind(execution.target_version.to_string())
        .bind(previous_versions)
        .bind(execution.environment.as_str())
        .bind(enum_to_text(&execution.strategy)?)
        .bind(&execution.requester_email)
        .bind(enum_to_text(&execution.status)?)
        .bind(&execution.trace_id)
        .bind(execution.force)
        .bind(&execution.metadata)
        .bind(execution.created_at)
        .bind(execution.started_at)
        .bind(execution.ended_at)
        .execute(&self.pool)
        .await?;

        for stage in &execution.stages {
            self.append_stage(execution.id, stage).await?;
        }
        Ok(())
    }

    async fn get(&self, id: ResourceId) -> DbResult<DeploymentExecution> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM deployment_executions WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("deployment execution {id}")))?;
        let stages = self.load_stages(*id.as_uuid()).await?;
        let node_results = self.load_node_results(*id.as_uuid()).await?;
        row_to_execution(row, stages, node_results)
    }

    async fn list(
        &self,
        module_name: Option<&str>,
        environment: Option<Environment>,
        limit: i64,
    ) -> DbResult<Vec<DeploymentExecution>> {
        let env_str = environment.map(|e| e.as_str().to_string());
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM deployment_executions
            WHERE ($1::text IS NULL OR module_name = $1)
              AND ($2::text IS NULL OR environment = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(module_name)
        .bind(env_str)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let stages = self.load_stages(row.id).await?;
            let node_results = self.load_node_results(row.id).await?;
            out.push(row_to_execution(row, stages, node_results)?);
        }
        Ok(out)
    }

    async fn list_active_for_lock(
        &self,
        module_name: &str,
        environment: Environment,
    ) -> DbResult<Vec<DeploymentExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM deployment_executions
            WHERE module_name = $1 AND environment = $2
              AND status NOT IN ('succeeded', 'failed', 'rolled_back', 'rolled_back_with_errors',
                                  'rejected_approval', 'expired', 'cancelled')
            "#,
        )
        .bind(module_name)
        .bind(environment.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let stages = self.load_stages(row.id).await?;
            let node_results = self.load_node_results(row.id).await?;
            out.push(row_to_execution(row, stages, node_results)?);
        }
        Ok(out)
    }

    async fn set_status(
        &self,
        id: ResourceId,
        status: ExecutionStatus,
        ended_at: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE deployment_executions SET status = $2, ended_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(enum_to_text(&status)?)
            .bind(ended_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_started(&self, id: ResourceId, started_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE deployment_executions SET started_at = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(started_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_previous_versions(
        &self,
        id: ResourceId,
        previous_versions: &HashMap<NodeId, Version>,
    ) -> DbResult<()> {
        let value: serde_json::Value = serde_json::Value::Object(
            previous_versions
                .iter()
                .map(|(node, version)| (node.0.as_uuid().to_string(), version.to_string().into()))
                .collect(),
        );
        sqlx::query("UPDATE deployment_executions SET previous_versions = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_stage(&self, execution_id: ResourceId, stage: &Stage) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deployment_stages (id, execution_id, name, status, message, context, started_at, ended_at, seq)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8,
                    COALESCE((SELECT MAX(seq) FROM deployment_stages WHERE execution_id = $2), 0) + 1)
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(execution_id.as_uuid())
        .bind(enum_to_text(&stage.name)?)
        .bind(enum_to_text(&stage.status)?)
        .bind(&stage.message)
        .bind(&stage.context)
        .bind(stage.started_at)
        .bind(stage.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_node_result(
        &self,
        execution_id: ResourceId,
        result: &NodeResult,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deployment_node_results
                (id, execution_id, node_id, from_version, to_version, status, duration_ms, error, retry_count, rolled_back)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (execution_id, node_id) DO UPDATE SET
                from_version = EXCLUDED.from_version,
                to_version = EXCLUDED.to_version,
                status = EXCLUDED.status,
                duration_ms = EXCLUDED.duration_ms,
                error = EXCLUDED.error,
                retry_count = EXCLUDED.retry_count,
                rolled_back = EXCLUDED.rolled_back,
                recorded_at = NOW()
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(execution_id.as_uuid())
        .bind(result.node_id.0.as_uuid())
        .bind(result.from_version.as_ref().map(|v| v.to_string()))
        .bind(result.to_version.to_string())
        .bind(enum_to_text(&result.status)?)
        .bind(result.duration_ms.map(|d| d as i64))
        .bind(&result.error)
        .bind(result.retry_count as i32)
        .bind(result.rolled_back)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
