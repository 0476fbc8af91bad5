//! Orchestrator facade (C10): create/get/list/rollback/cancel a deployment
//! and record approval decisions. This is the only place the HTTP layer
//! touches the lock, idempotency store, and job queue directly; everything
//! past `CreateDeployment` is driven by the worker pool in `rollout-scheduler`.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use rollout_core::approval::ApprovalStatus;
use rollout_core::environment::Environment;
use rollout_core::event::{Event, EventPayload};
use rollout_core::execution::{
    CreateDeploymentCommand, DeploymentExecution, ExecutionStatus, Stage, StageName,
};
use rollout_core::id::ResourceId;
use rollout_core::idempotency::IdempotencyOutcome;
use rollout_core::job::{Job, JobStatus};
use rollout_core::lock::deploy_lock_name;
use rollout_core::module::{ModuleName, Version};
use rollout_core::strategy::StrategyKind;

use crate::AppState;
use crate::error::ApiError;

const ACCEPT_LOCK_WAIT: Duration = Duration::from_secs(2);
const ACCEPT_LOCK_TTL: Duration = Duration::from_secs(30);
const IDEMPOTENCY_TTL: chrono::Duration = chrono::Duration::hours(24);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_deployment).get(list_deployments))
        .route("/{id}", get(get_deployment))
        .route("/{id}/rollback", post(rollback_deployment))
        .route("/{id}/approve", post(approve_deployment))
        .route("/{id}/reject", post(reject_deployment))
        .route("/{id}/cancel", post(cancel_deployment))
}

#[derive(Debug, Serialize)]
pub struct DeploymentHandle {
    pub execution_id: ResourceId,
    pub status: ExecutionStatus,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub estimated_duration_seconds: u64,
    pub trace_id: String,
    pub links: DeploymentLinks,
}

#[derive(Debug, Serialize)]
pub struct DeploymentLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    pub events: String,
}

impl DeploymentLinks {
    fn for_execution(id: ResourceId) -> Self {
        Self {
            self_link: format!("/api/v1/deployments/{id}"),
            events: format!("/ws?channel=run:{id}"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDeploymentsFilter {
    pub module_name: Option<String>,
    pub environment: Option<Environment>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub actor_email: String,
}

#[derive(Debug, Serialize)]
pub struct RollbackHandle {
    pub rollback_id: ResourceId,
    pub status: ExecutionStatus,
    pub nodes_affected: usize,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalDecisionRequest {
    pub approver_email: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub actor_email: String,
}

// --- CreateDeployment ----------------------------------------------------

async fn create_deployment(
    State(state): State<AppState>,
    Json(command): Json<CreateDeploymentCommand>,
) -> Result<Json<DeploymentHandle>, ApiError> {
    let module_name = ModuleName::parse(&command.module_name)?;
    let version = Version::parse(&command.version)?;
    if command.requester_email.trim().is_empty() {
        return Err(ApiError::BadRequest("requesterEmail is required".into()));
    }

    let idempotency_key = command.client_idempotency_key.clone().unwrap_or_else(|| {
        format!(
            "create-deployment:{}:{}:{}:{}",
            module_name, version, command.target_environment, command.requester_email
        )
    });

    let policy = state.runtime_config.policy_for(command.target_environment);
    let strategy = command.strategy.unwrap_or(policy.default_strategy);
    if !policy.allows(strategy) {
        return Err(ApiError::BadRequest(format!(
            "{strategy} is not an allowed strategy in {}",
            command.target_environment
        )));
    }

    let execution_id = ResourceId::new_v4();
    let trace_id = ResourceId::new().to_string();
    let now = chrono::Utc::now();

    let mut metadata = command.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
    if let Some(description) = &command.description {
        metadata["description"] = serde_json::Value::String(description.clone());
    }

    let execution = DeploymentExecution {
        id: execution_id,
        module_name,
        target_version: version,
        previous_versions: std::collections::HashMap::new(),
        environment: command.target_environment,
        strategy,
        requester_email: command.requester_email.clone(),
        created_at: now,
        started_at: None,
        ended_at: None,
        status: ExecutionStatus::Created,
        stages: vec![Stage::pending(StageName::Validate)],
        node_results: Vec::new(),
        trace_id: trace_id.clone(),
        force: command.force,
        metadata,
    };

    let handle_value = serde_json::json!({
        "executionId": execution.id,
        "status": execution.status,
        "startTime": execution.created_at,
        "estimatedDurationSeconds": estimated_duration_seconds(strategy),
        "traceId": execution.trace_id,
    });

    match state
        .idempotency
        .check_or_insert(&idempotency_key, handle_value, IDEMPOTENCY_TTL)
        .await
        .map_err(ApiError::from)?
    {
        IdempotencyOutcome::Duplicate(prior) => {
            return Ok(Json(decode_prior_handle(prior)?));
        }
        IdempotencyOutcome::Fresh => {}
    }

    let lock_name = deploy_lock_name(execution.environment.as_str(), execution.module_name.as_str());
    let handle = state
        .lock
        .acquire(&lock_name, ACCEPT_LOCK_TTL, ACCEPT_LOCK_WAIT)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| {
            ApiError::Conflict(format!(
                "an in-flight deployment already holds the lock for {}/{}",
                execution.environment, execution.module_name
            ))
        })?;

    if !command.force {
        let active = state
            .executions
            .list_active_for_lock(execution.module_name.as_str(), execution.environment)
            .await
            .map_err(ApiError::from)?;
        if !active.is_empty() {
            state.lock.release(&handle).await.map_err(ApiError::from)?;
            return Err(ApiError::Conflict(format!(
                "an active deployment already exists for {}/{}",
                execution.environment, execution.module_name
            )));
        }
    }

    if let Err(e) = state.executions.create(&execution).await {
        state.lock.release(&handle).await.map_err(ApiError::from)?;
        return Err(ApiError::from(e));
    }

    let job = Job {
        id: ResourceId::new(),
        deployment_execution_id: execution.id,
        status: JobStatus::Pending,
        payload: serde_json::json!({}),
        created_at: now,
        started_at: None,
        ended_at: None,
        error_message: None,
        retry_count: 0,
        max_retries: rollout_core::job::DEFAULT_MAX_RETRIES,
        next_retry_at: None,
        locked_until: None,
        processing_instance: None,
        priority: 0,
    };
    if let Err(e) = state.jobs.enqueue(&job).await {
        state.lock.release(&handle).await.map_err(ApiError::from)?;
        return Err(ApiError::from(e));
    }

    // The worker re-acquires this lock per the pipeline's own run(); releasing
    // here keeps acceptance from blocking on the whole pipeline duration.
    state.lock.release(&handle).await.map_err(ApiError::from)?;

    state
        .executor
        .events
        .emit(Event {
            timestamp: now,
            trace_id: trace_id.clone(),
            span_id: ResourceId::new().to_string(),
            deployment_execution_id: execution.id,
            payload: EventPayload::DeploymentStarted {
                module_name: execution.module_name.to_string(),
                version: execution.target_version.to_string(),
                environment: execution.environment.to_string(),
                strategy: execution.strategy.to_string(),
            },
        })
        .await;

    Ok(Json(DeploymentHandle {
        execution_id: execution.id,
        status: execution.status,
        start_time: execution.created_at,
        estimated_duration_seconds: estimated_duration_seconds(strategy),
        trace_id,
        links: DeploymentLinks::for_execution(execution.id),
    }))
}

fn decode_prior_handle(value: serde_json::Value) -> Result<DeploymentHandle, ApiError> {
    let execution_id: ResourceId = serde_json::from_value(value["executionId"].clone())
        .map_err(|e| ApiError::Internal(format!("corrupt idempotency record: {e}")))?;
    let status: ExecutionStatus = serde_json::from_value(value["status"].clone())
        .map_err(|e| ApiError::Internal(format!("corrupt idempotency record: {e}")))?;
    let start_time: chrono::DateTime<chrono::Utc> = serde_json::from_value(value["startTime"].clone())
        .map_err(|e| ApiError::Internal(format!("corrupt idempotency record: {e}")))?;
    let estimated_duration_seconds = value["estimatedDurationSeconds"].as_u64().unwrap_or(0);
    let trace_id = value["traceId"].as_str().unwrap_or_default().to_string();
    Ok(DeploymentHandle {
        execution_id,
        status,
        start_time,
        estimated_duration_seconds,
        trace_id,
        links: DeploymentLinks::for_execution(execution_id),
    })
}

fn estimated_duration_seconds(strategy: StrategyKind) -> u64 {
    match strategy {
        StrategyKind::Direct => 60,
        StrategyKind::Rolling => 600,
        StrategyKind::BlueGreen => 300,
        StrategyKind::Canary => 1800,
    }
}

// --- GetDeployment / ListDeployments --------------------------------------

async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
) -> Result<Json<DeploymentExecution>, ApiError> {
    let execution = state.executions.get(id).await.map_err(ApiError::from)?;
    Ok(Json(execution))
}

async fn list_deployments(
    State(state): State<AppState>,
    Query(filter): Query<ListDeploymentsFilter>,
) -> Result<Json<Vec<DeploymentExecution>>, ApiError> {
    let executions = state
        .executions
        .list(filter.module_name.as_deref(), filter.environment, filter.limit)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(executions))
}

// --- RollbackDeployment ----------------------------------------------------

async fn rollback_deployment(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
    Json(req): Json<RollbackRequest>,
) -> Result<Json<RollbackHandle>, ApiError> {
    let original = state.executions.get(id).await.map_err(ApiError::from)?;

    let mut distinct_versions: Vec<String> = original
        .previous_versions
        .values()
        .map(|v| v.to_string())
        .collect();
    distinct_versions.sort();
    distinct_versions.dedup();
    let rollback_version = match distinct_versions.as_slice() {
        [] => {
            return Err(ApiError::Conflict(
                "no previous version recorded for this module/environment".into(),
            ));
        }
        [single] => Version::parse(single).map_err(ApiError::from)?,
        _ => {
            return Err(ApiError::Conflict(
                "nodes disagree on previous version; rollback target is ambiguous".into(),
            ));
        }
    };

    let now = chrono::Utc::now();
    let rollback_id = ResourceId::new_v4();
    let trace_id = ResourceId::new().to_string();
    let rollback = DeploymentExecution {
        id: rollback_id,
        module_name: original.module_name.clone(),
        target_version: rollback_version,
        previous_versions: std::collections::HashMap::new(),
        environment: original.environment,
        strategy: original.strategy,
        requester_email: req.actor_email,
        created_at: now,
        started_at: None,
        ended_at: None,
        status: ExecutionStatus::Created,
        stages: vec![Stage::pending(StageName::Validate)],
        node_results: Vec::new(),
        trace_id: trace_id.clone(),
        force: true,
        metadata: original.metadata.clone(),
    };

    let nodes_affected = state.registry.list_nodes(original.environment).await.len();

    state.executions.create(&rollback).await.map_err(ApiError::from)?;
    let job = Job {
        id: ResourceId::new(),
        deployment_execution_id: rollback.id,
        status: JobStatus::Pending,
        payload: serde_json::json!({ "rollbackOf": original.id }),
        created_at: now,
        started_at: None,
        ended_at: None,
        error_message: None,
        retry_count: 0,
        max_retries: rollout_core::job::DEFAULT_MAX_RETRIES,
        next_retry_at: None,
        locked_until: None,
        processing_instance: None,
        priority: 0,
    };
    state.jobs.enqueue(&job).await.map_err(ApiError::from)?;

    Ok(Json(RollbackHandle {
        rollback_id,
        status: rollback.status,
        nodes_affected,
    }))
}

// --- ApprovalDecision ------------------------------------------------------

async fn approve_deployment(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
    Json(req): Json<ApprovalDecisionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    decide_approval(&state, id, req, ApprovalStatus::Approved).await
}

async fn reject_deployment(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
    Json(req): Json<ApprovalDecisionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    decide_approval(&state, id, req, ApprovalStatus::Rejected).await
}

async fn decide_approval(
    state: &AppState,
    execution_id: ResourceId,
    req: ApprovalDecisionRequest,
    status: ApprovalStatus,
) -> Result<Json<serde_json::Value>, ApiError> {
    let approval = state
        .approvals
        .get_for_execution(execution_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("no pending approval for execution {execution_id}")))?;

    if approval.status.is_terminal() {
        return Err(ApiError::Conflict("approval has already been decided".into()));
    }
    if !approval.is_eligible_approver(&req.approver_email) {
        return Err(ApiError::Forbidden(format!(
            "{} is not an eligible approver for this deployment",
            req.approver_email
        )));
    }

    state
        .approvals
        .decide(approval.id, status, &req.approver_email, req.reason.as_deref())
        .await
        .map_err(ApiError::from)?;

    state
        .executor
        .events
        .emit(Event {
            timestamp: chrono::Utc::now(),
            trace_id: String::new(),
            span_id: ResourceId::new().to_string(),
            deployment_execution_id: execution_id,
            payload: EventPayload::ApprovalDecided {
                approval_id: approval.id,
                status,
                by_email: Some(req.approver_email),
            },
        })
        .await;

    Ok(Json(serde_json::json!({ "approvalId": approval.id, "status": status })))
}

// --- CancelDeployment ------------------------------------------------------

async fn cancel_deployment(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let execution = state.executions.get(id).await.map_err(ApiError::from)?;
    if execution.status.is_terminal() {
        return Err(ApiError::Conflict("execution is already terminal".into()));
    }

    state
        .jobs
        .cancel_for_execution(id)
        .await
        .map_err(ApiError::from)?;

    state
        .executor
        .events
        .emit(Event {
            timestamp: chrono::Utc::now(),
            trace_id: execution.trace_id.clone(),
            span_id: ResourceId::new().to_string(),
            deployment_execution_id: id,
            payload: EventPayload::DeploymentTerminal {
                status: ExecutionStatus::Cancelled,
                message: Some(format!("cancelled by {}", req.actor_email)),
            },
        })
        .await;

    Ok(Json(serde_json::json!({ "executionId": id, "status": "cancel_requested" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_duration_scales_with_strategy_risk() {
        assert!(estimated_duration_seconds(StrategyKind::Direct) < estimated_duration_seconds(StrategyKind::Rolling));
        assert!(estimated_duration_seconds(StrategyKind::Rolling) < estimated_duration_seconds(StrategyKind::Canary));
    }
}
