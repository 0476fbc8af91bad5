//! The pipeline executor (C9): drives a `DeploymentExecution` through
//! Validate, Verify, PreflightHealth, [Approve], Deploy, Stabilize, Commit,
//! with rollback on failure during Deploy or Stabilize. Every resumable
//! decision point is persisted as a `deployment_stages` row before the
//! executor returns its worker slot, so a different worker picking the same
//! job back up (after a crash, or simply re-polling) resumes from the
//! execution's persisted `status` rather than from the top.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rollout_core::environment::EnvironmentPolicy;
use rollout_core::event::{Event, EventPayload, EventSink};
use rollout_core::execution::{
    DeploymentExecution, ExecutionStatus, NodeResultStatus, Stage, StageName, StageStatus,
};
use rollout_core::id::ResourceId;
use rollout_core::job::JobStatus;
use rollout_core::lock::{DistributedLock, LockHandle};
use rollout_core::module::Artifact;
use rollout_core::node::{Node, NodeClient};
use rollout_core::registry::ClusterRegistry;
use rollout_core::strategy::StrategyKind;
use rollout_core::verify::Verifier;
use rollout_core::{Error, Result};
use rollout_db::{ApprovalRepo, ExecutionRepo, JobRepo};
use rollout_strategies::apply::rollback_batch;
use rollout_strategies::health::observe_window;
use rollout_strategies::{
    BlueGreenStrategy, CanaryStrategy, DirectStrategy, RollingStrategy, Strategy, StrategyInput,
    StrategyParams,
};

use crate::control::PipelineControl;

const JOB_WATCH_INTERVAL: Duration = Duration::from_secs(5);

pub struct PipelineExecutor {
    pub executions: Arc<dyn ExecutionRepo>,
    pub approvals: Arc<dyn ApprovalRepo>,
    pub jobs: Arc<dyn JobRepo>,
    pub registry: ClusterRegistry,
    pub node_client: Arc<dyn NodeClient>,
    pub verifier: Arc<dyn Verifier>,
    pub events: Arc<dyn EventSink>,
    pub lock: Arc<dyn DistributedLock>,
    pub strategies: StrategyParams,
}

impl PipelineExecutor {
    /// Drives `execution_id` to a terminal status. `lock_handle` must already
    /// be held for `deploy:{env}:{module}` by the caller (the facade
    /// acquires it on accept per the recommended keep-for-whole-pipeline
    /// policy); this call releases it on return.
    pub async fn run(
        &self,
        execution_id: ResourceId,
        job_id: ResourceId,
        lock_handle: LockHandle,
        policy: &EnvironmentPolicy,
    ) -> Result<ExecutionStatus> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let watcher = self.spawn_job_watcher(job_id, cancelled.clone());

        let result = self.run_inner(execution_id, policy, cancelled).await;

        watcher.abort();
        self.lock.release(&lock_handle).await?;
        result
    }

    fn spawn_job_watcher(
        &self,
        job_id: ResourceId,
        cancelled: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(JOB_WATCH_INTERVAL).await;
                match jobs.get(job_id).await {
                    Ok(job) if job.status == JobStatus::Cancelled => {
                        cancelled.store(true, Ordering::SeqCst);
                        return;
                    }
                    Ok(_) => {}
                    Err(_) => return,
                }
            }
        })
    }

    async fn run_inner(
        &self,
        execution_id: ResourceId,
        policy: &EnvironmentPolicy,
        cancelled: Arc<AtomicBool>,
    ) -> Result<ExecutionStatus> {
        let mut execution = self.executions.get(execution_id).await?;
        if execution.status.is_terminal() {
            return Ok(execution.status);
        }

        if execution.status == ExecutionStatus::Created {
            self.transition(&mut execution, ExecutionStatus::Validating).await?;
            if let Err(e) = self.validate(&execution).await {
                return self.fail_stage(&mut execution, StageName::Validate, e).await;
            }
            self.append_stage(&mut execution, StageName::Validate, StageStatus::Succeeded, None)
                .await?;
        }

        if matches!(execution.status, ExecutionStatus::Validating) {
            self.transition(&mut execution, ExecutionStatus::Verifying).await?;
            if let Err(e) = self.verify(&execution).await {
                return self.fail_stage(&mut execution, StageName::Verify, e).await;
            }
            self.append_stage(&mut execution, StageName::Verify, StageStatus::Succeeded, None)
                .await?;
        }

        if matches!(execution.status, ExecutionStatus::Verifying) {
            if let Err(e) = self.preflight(&execution, policy).await {
                return self.fail_stage(&mut execution, StageName::PreflightHealth, e).await;
            }
            self.append_stage(&mut execution, StageName::PreflightHealth, StageStatus::Succeeded, None)
                .await?;
            if policy.requires_approval {
                self.transition(&mut execution, ExecutionStatus::AwaitingApproval).await?;
            } else {
                self.transition(&mut execution, ExecutionStatus::Deploying).await?;
            }
        }

        if matches!(execution.status, ExecutionStatus::AwaitingApproval) {
            match self.await_approval(&execution, policy, cancelled.clone()).await {
                Ok(()) => self.transition(&mut execution, ExecutionStatus::Deploying).await?,
                Err(e) => {
                    let status = if matches!(e, Error::Timeout(_)) {
                        ExecutionStatus::Expired
                    } else {
                        ExecutionStatus::RejectedApproval
                    };
                    return self.terminate(&mut execution, status, Some(e.to_string())).await;
                }
            }
        }

        if matches!(execution.status, ExecutionStatus::Deploying) {
            match self.deploy(&mut execution, policy, cancelled.clone()).await {
                Ok(()) => {
                    self.append_stage(&mut execution, StageName::Deploy, StageStatus::Succeeded, None)
                        .await?;
                    self.transition(&mut execution, ExecutionStatus::Stabilizing).await?
                }
                Err(e) => {
                    return self.rollback(&mut execution, e.to_string()).await;
                }
            }
        }

        if matches!(execution.status, ExecutionStatus::Stabilizing) {
            match self.stabilize(&execution, policy).await {
                Ok(()) => {
                    self.append_stage(&mut execution, StageName::Stabilize, StageStatus::Succeeded, None)
                        .await?;
                }
                Err(e) => return self.rollback(&mut execution, e.to_string()).await,
            }
        }

        self.commit(&mut execution).await
    }

    async fn transition(
        &self,
        execution: &mut DeploymentExecution,
        next: ExecutionStatus,
    ) -> Result<()> {
        if !execution.status.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal transition {:?} -> {next:?}",
                execution.status
            )));
        }
        execution.status = next;
        self.executions.set_status(execution.id, next, None).await?;
        Ok(())
    }

    async fn emit(&self, execution: &DeploymentExecution, payload: EventPayload) {
        self.events
            .emit(Event {
                timestamp: chrono::Utc::now(),
                trace_id: execution.trace_id.clone(),
                span_id: ResourceId::new().to_string(),
                deployment_execution_id: execution.id,
                payload,
            })
            .await;
    }

    async fn append_stage(
        &self,
        execution: &mut DeploymentExecution,
        name: StageName,
        status: StageStatus,
        message: Option<String>,
    ) -> Result<()> {
        let stage = Stage {
            name,
            status,
            started_at: Some(chrono::Utc::now()),
            ended_at: if matches!(status, StageStatus::Running) {
                None
            } else {
                Some(chrono::Utc::now())
            },
            message,
            context: serde_json::Value::Null,
        };
        self.executions.append_stage(execution.id, &stage).await?;
        execution.stages.push(stage);
        Ok(())
    }

    // --- Validate ---------------------------------------------------

    async fn validate(&self, execution: &DeploymentExecution) -> Result<()> {
        if !execution.force {
            let active = self
                .executions
                .list_active_for_lock(execution.module_name.as_str(), execution.environment)
                .await?;
            if active.iter().any(|e| e.id != execution.id) {
                return Err(Error::Conflict(format!(
                    "an active deployment already exists for {}/{}",
                    execution.environment, execution.module_name
                )));
            }
        }
        Ok(())
    }

    // --- Verify -------------------------------------------------------

    fn artifact(&self, execution: &DeploymentExecution) -> Result<Artifact> {
        let raw = execution
            .metadata
            .get("artifact")
            .ok_or_else(|| Error::InvalidInput("metadata.artifact is required".into()))?;
        serde_json::from_value(raw.clone())
            .map_err(|e| Error::InvalidInput(format!("invalid metadata.artifact: {e}")))
    }

    async fn verify(&self, execution: &DeploymentExecution) -> Result<()> {
        let artifact = self.artifact(execution)?;
        self.verifier.verify(&artifact).await
    }

    // --- PreflightHealth ------------------------------------------------

    async fn preflight(&self, execution: &DeploymentExecution, policy: &EnvironmentPolicy) -> Result<()> {
        let ratio = self.registry.healthy_ratio(execution.environment).await;
        if ratio < policy.min_healthy_ratio {
            return Err(Error::Policy(format!(
                "cluster healthy ratio {ratio:.2} below minimum {:.2}",
                policy.min_healthy_ratio
            )));
        }
        Ok(())
    }

    // --- Approve ---------------------------------------------------------

    async fn await_approval(
        &self,
        execution: &DeploymentExecution,
        policy: &EnvironmentPolicy,
        cancelled: Arc<AtomicBool>,
    ) -> Result<()> {
        self.emit(
            execution,
            EventPayload::ApprovalRequested {
                approval_id: ResourceId::new(),
                timeout_at: chrono::Utc::now() + policy.approval_ttl,
            },
        )
        .await;

        let control = PipelineControl {
            execution_id: execution.id,
            module_name: execution.module_name.as_str().to_string(),
            version: execution.target_version.clone(),
            environment: execution.environment,
            requester_email: execution.requester_email.clone(),
            approver_emails: Vec::new(),
            approval_ttl: policy.approval_ttl,
            executions: self.executions.clone(),
            approvals: self.approvals.clone(),
            cancelled,
            stage_name: StageName::Approve,
        };

        use rollout_strategies::{ApprovalOutcome, StrategyControl};
        match control.await_approval(serde_json::Value::Null).await? {
            ApprovalOutcome::Approved => Ok(()),
            ApprovalOutcome::Rejected => Err(Error::Forbidden("approval rejected".into())),
            ApprovalOutcome::Expired => Err(Error::Timeout("approval window elapsed".into())),
        }
    }

    // --- Deploy ------------------------------------------------------

    async fn deploy(
        &self,
        execution: &mut DeploymentExecution,
        policy: &EnvironmentPolicy,
        cancelled: Arc<AtomicBool>,
    ) -> Result<()> {
        if !policy.allows(execution.strategy) {
            return Err(Error::Policy(format!(
                "strategy {} is not allowed in {}",
                execution.strategy, execution.environment
            )));
        }

        let nodes = self.registry.list_nodes(execution.environment).await;
        let mut previous_versions = HashMap::new();
        for node in &nodes {
            if let Some(v) = node.current_versions.get(execution.module_name.as_str()) {
                previous_versions.insert(node.id, v.clone());
            }
        }
        self.executions
            .set_previous_versions(execution.id, &previous_versions)
            .await?;

        let artifact = self.artifact(execution)?;
        let control = PipelineControl {
            execution_id: execution.id,
            module_name: execution.module_name.as_str().to_string(),
            version: execution.target_version.clone(),
            environment: execution.environment,
            requester_email: execution.requester_email.clone(),
            approver_emails: Vec::new(),
            approval_ttl: policy.approval_ttl,
            executions: self.executions.clone(),
            approvals: self.approvals.clone(),
            cancelled,
            stage_name: StageName::Deploy,
        };

        let input = StrategyInput {
            execution_id: execution.id,
            module_name: execution.module_name.as_str(),
            artifact_digest: &artifact.digest,
            signature: &artifact.signature,
            target_version: &execution.target_version,
            nodes,
        };

        let outcome = match execution.strategy {
            StrategyKind::Direct => {
                DirectStrategy::new(self.strategies.direct.clone())
                    .execute(input, self.node_client.as_ref(), &control)
                    .await?
            }
            StrategyKind::Rolling => {
                RollingStrategy::new(self.strategies.rolling.clone())
                    .execute(input, self.node_client.as_ref(), &control)
                    .await?
            }
            StrategyKind::BlueGreen => {
                BlueGreenStrategy::new(self.strategies.blue_green.clone())
                    .execute(input, self.node_client.as_ref(), &control)
                    .await?
            }
            StrategyKind::Canary => {
                CanaryStrategy::new(self.strategies.canary.clone())
                    .execute(input, self.node_client.as_ref(), &control)
                    .await?
            }
        };

        for result in &outcome.node_results {
            self.executions.upsert_node_result(execution.id, result).await?;
            self.emit(
                execution,
                EventPayload::NodeResultRecorded {
                    result: Box::new(result.clone()),
                },
            )
            .await;
            execution.node_results.retain(|r| r.node_id != result.node_id);
            execution.node_results.push(result.clone());
        }

        if outcome.succeeded {
            Ok(())
        } else {
            Err(Error::Policy(
                outcome
                    .failure_reason
                    .unwrap_or_else(|| "deploy stage failed".to_string()),
            ))
        }
    }

    // --- Stabilize -----------------------------------------------------

    async fn stabilize(&self, execution: &DeploymentExecution, _policy: &EnvironmentPolicy) -> Result<()> {
        let nodes = self.registry.list_nodes(execution.environment).await;
        let params = &self.strategies.rolling;
        let snapshots = observe_window(
            &nodes,
            self.node_client.as_ref(),
            params.health_samples,
            Duration::from_secs(params.sample_interval_seconds),
        )
        .await?;
        if snapshots
            .iter()
            .any(|s| s.healthy_ratio < params.healthy_threshold)
        {
            return Err(Error::Policy(
                "cluster failed post-deploy stabilization window".into(),
            ));
        }
        Ok(())
    }

    // --- Commit ----------------------------------------------------------

    async fn commit(&self, execution: &mut DeploymentExecution) -> Result<ExecutionStatus> {
        self.transition(execution, ExecutionStatus::Succeeded).await?;
        for result in &execution.node_results {
            if result.status == NodeResultStatus::Success {
                self.registry
                    .commit_version(
                        result.node_id,
                        execution.module_name.as_str(),
                        result.to_version.clone(),
                    )
                    .await?;
            }
        }
        self.append_stage(execution, StageName::Commit, StageStatus::Succeeded, None)
            .await?;
        execution.ended_at = Some(chrono::Utc::now());
        self.executions
            .set_status(execution.id, ExecutionStatus::Succeeded, execution.ended_at)
            .await?;
        self.emit(
            execution,
            EventPayload::DeploymentTerminal {
                status: ExecutionStatus::Succeeded,
                message: None,
            },
        )
        .await;
        Ok(ExecutionStatus::Succeeded)
    }

    // --- Rollback --------------------------------------------------------

    async fn rollback(
        &self,
        execution: &mut DeploymentExecution,
        reason: String,
    ) -> Result<ExecutionStatus> {
        self.transition(execution, ExecutionStatus::RollingBack).await?;
        self.emit(
            execution,
            EventPayload::RollbackStarted {
                reason: reason.clone(),
            },
        )
        .await;

        let mut already_upgraded: Vec<(Node, rollout_core::module::Version)> = Vec::new();
        for result in execution.node_results.iter().rev() {
            if result.status != NodeResultStatus::Success {
                continue;
            }
            let Some(previous) = execution.previous_versions.get(&result.node_id) else {
                continue;
            };
            if let Ok(node) = self.registry.get_node(result.node_id).await {
                already_upgraded.push((node, previous.clone()));
            }
        }

        let rollback_results = rollback_batch(
            &already_upgraded,
            self.node_client.as_ref(),
            execution.id,
            execution.module_name.as_str(),
        )
        .await;

        let mut any_failed = false;
        for result in &rollback_results {
            any_failed |= result.status == NodeResultStatus::RollbackFailed;
            self.executions
                .upsert_node_result(execution.id, result)
                .await?;
            self.emit(
                execution,
                EventPayload::NodeResultRecorded {
                    result: Box::new(result.clone()),
                },
            )
            .await;
        }

        let final_status = if any_failed {
            ExecutionStatus::RolledBackWithErrors
        } else {
            ExecutionStatus::RolledBack
        };
        self.terminate(execution, final_status, Some(reason)).await
    }

    async fn fail_stage(
        &self,
        execution: &mut DeploymentExecution,
        stage: StageName,
        error: Error,
    ) -> Result<ExecutionStatus> {
        self.append_stage(execution, stage, StageStatus::Failed, Some(error.to_string()))
            .await?;
        self.terminate(execution, ExecutionStatus::Failed, Some(error.to_string()))
            .await
    }

    async fn terminate(
        &self,
        execution: &mut DeploymentExecution,
        status: ExecutionStatus,
        message: Option<String>,
    ) -> Result<ExecutionStatus> {
        execution.status = status;
        execution.ended_at = Some(chrono::Utc::now());
        self.executions
            .set_status(execution.id, status, execution.ended_at)
            .await?;
        self.emit(
            execution,
            EventPayload::DeploymentTerminal { status, message },
        )
        .await;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rollout_core::environment::Environment;
    use rollout_core::id::ResourceId;
    use rollout_core::module::{Artifact, ModuleName, Version};
    use rollout_core::node::{HealthStatus, Node, NodeId, Pool};
    use rollout_core::strategy::StrategyKind;
    use rollout_core::verify::Verifier;
    use rollout_db::DbResult;
    use rollout_node::mock::{MockNodeClient, Scripted};
    use std::collections::HashMap as Map;
    use tokio::sync::Mutex as AsyncMutex;

    struct FakeExecutionRepo(AsyncMutex<Map<ResourceId, DeploymentExecution>>);

    impl FakeExecutionRepo {
        fn seeded(execution: DeploymentExecution) -> Self {
            let mut map = Map::new();
            map.insert(execution.id, execution);
            Self(AsyncMutex::new(map))
        }
    }

    #[async_trait]
    impl ExecutionRepo for FakeExecutionRepo {
        async fn create(&self, execution: &DeploymentExecution) -> DbResult<()> {
            self.0.lock().await.insert(execution.id, execution.clone());
            Ok(())
        }

        async fn get(&self, id: ResourceId) -> DbResult<DeploymentExecution> {
            self.0
                .lock()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| rollout_db::DbError::NotFound(id.to_string()))
        }

        async fn list(
            &self,
            _module_name: Option<&str>,
            _environment: Option<Environment>,
            _limit: i64,
        ) -> DbResult<Vec<DeploymentExecution>> {
            Ok(self.0.lock().await.values().cloned().collect())
        }

        async fn list_active_for_lock(
            &self,
            module_name: &str,
            environment: Environment,
        ) -> DbResult<Vec<DeploymentExecution>> {
            Ok(self
                .0
                .lock()
                .await
                .values()
                .filter(|e| {
                    e.module_name.as_str() == module_name
                        && e.environment == environment
                        && !e.status.is_terminal()
                })
                .cloned()
                .collect())
        }

        async fn set_status(
            &self,
            id: ResourceId,
            status: ExecutionStatus,
            ended_at: Option<chrono::DateTime<chrono::Utc>>,
        ) -> DbResult<()> {
            if let Some(e) = self.0.lock().await.get_mut(&id) {
                e.status = status;
                e.ended_at = ended_at;
            }
            Ok(())
        }

        async fn mark_started(
            &self,
            id: ResourceId,
            started_at: chrono::DateTime<chrono::Utc>,
        ) -> DbResult<()> {
            if let Some(e) = self.0.lock().await.get_mut(&id) {
                e.started_at = Some(started_at);
            }
            Ok(())
        }

        async fn set_previous_versions(
            &self,
            id: ResourceId,
            previous_versions: &Map<NodeId, Version>,
        ) -> DbResult<()> {
            if let Some(e) = self.0.lock().await.get_mut(&id) {
                e.previous_versions = previous_versions.clone();
            }
            Ok(())
        }

        async fn append_stage(&self, execution_id: ResourceId, stage: &Stage) -> DbResult<()> {
            if let Some(e) = self.0.lock().await.get_mut(&execution_id) {
                e.stages.push(stage.clone());
            }
            Ok(())
        }

        async fn upsert_node_result(
            &self,
            execution_id: ResourceId,
            result: &rollout_core::execution::NodeResult,
        ) -> DbResult<()> {
            if let Some(e) = self.0.lock().await.get_mut(&execution_id) {
                e.node_results.retain(|r| r.node_id != result.node_id);
                e.node_results.push(result.clone());
            }
            Ok(())
        }
    }

    struct FakeApprovalRepo;

    #[async_trait]
    impl ApprovalRepo for FakeApprovalRepo {
        async fn create(&self, _request: &rollout_core::approval::ApprovalRequest) -> DbResult<()> {
            Ok(())
        }
        async fn get(&self, _id: ResourceId) -> DbResult<rollout_core::approval::ApprovalRequest> {
            unreachable!("not exercised by tests that skip the Approve stage")
        }
        async fn get_for_execution(
            &self,
            _execution_id: ResourceId,
        ) -> DbResult<Option<rollout_core::approval::ApprovalRequest>> {
            Ok(None)
        }
        async fn decide(
            &self,
            _id: ResourceId,
            _status: rollout_core::approval::ApprovalStatus,
            _responded_by_email: &str,
            _reason: Option<&str>,
        ) -> DbResult<()> {
            Ok(())
        }
        async fn expire_overdue(&self) -> DbResult<Vec<ResourceId>> {
            Ok(Vec::new())
        }
    }

    struct FakeJobRepo;

    #[async_trait]
    impl JobRepo for FakeJobRepo {
        async fn enqueue(&self, _job: &rollout_core::job::Job) -> DbResult<()> {
            Ok(())
        }
        async fn get(&self, id: ResourceId) -> DbResult<rollout_core::job::Job> {
            Ok(rollout_core::job::Job {
                id,
                deployment_execution_id: ResourceId::new(),
                status: rollout_core::job::JobStatus::Running,
                payload: serde_json::Value::Null,
                created_at: chrono::Utc::now(),
                started_at: None,
                ended_at: None,
                error_message: None,
                retry_count: 0,
                max_retries: 5,
                next_retry_at: None,
                locked_until: None,
                processing_instance: None,
                priority: 0,
            })
        }
        async fn claim(&self, _worker_id: &str, _lease: chrono::Duration) -> DbResult<Option<rollout_core::job::Job>> {
            Ok(None)
        }
        async fn complete(&self, _id: ResourceId) -> DbResult<()> {
            Ok(())
        }
        async fn fail(
            &self,
            _id: ResourceId,
            _error: &str,
            _retry_count: u32,
            _next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
        ) -> DbResult<()> {
            Ok(())
        }
        async fn cancel(&self, _id: ResourceId) -> DbResult<()> {
            Ok(())
        }
        async fn cancel_for_execution(&self, _execution_id: ResourceId) -> DbResult<()> {
            Ok(())
        }
        async fn sweep_expired_leases(&self) -> DbResult<u64> {
            Ok(0)
        }
    }

    struct FakeLock;

    #[async_trait]
    impl DistributedLock for FakeLock {
        async fn acquire(
            &self,
            name: &str,
            _ttl: Duration,
            _wait_timeout: Duration,
        ) -> Result<Option<LockHandle>> {
            Ok(Some(LockHandle {
                name: name.to_string(),
                owner_id: "test".to_string(),
                fencing_token: 1,
                expires_at: chrono::Utc::now() + chrono::Duration::minutes(5),
            }))
        }
        async fn release(&self, _handle: &LockHandle) -> Result<()> {
            Ok(())
        }
        async fn renew(&self, handle: &LockHandle, ttl: Duration) -> Result<LockHandle> {
            let mut next = handle.clone();
            next.expires_at = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap();
            Ok(next)
        }
    }

    struct AlwaysVerifies;

    #[async_trait]
    impl Verifier for AlwaysVerifies {
        async fn verify(&self, _artifact: &Artifact) -> Result<()> {
            Ok(())
        }
    }

    fn test_node(version: &str) -> Node {
        let mut current_versions = Map::new();
        current_versions.insert("payments-api".to_string(), Version::parse(version).unwrap());
        Node {
            id: NodeId(ResourceId::new()),
            hostname: "node.example".to_string(),
            environment: Environment::Development,
            current_versions,
            last_heartbeat: None,
            health: HealthStatus::Healthy,
            pool: None::<Pool>,
        }
    }

    fn test_execution(strategy: StrategyKind) -> DeploymentExecution {
        DeploymentExecution {
            id: ResourceId::new(),
            module_name: ModuleName::parse("payments-api").unwrap(),
            target_version: Version::parse("2.0.0").unwrap(),
            previous_versions: Map::new(),
            environment: Environment::Development,
            strategy,
            requester_email: "dev@example.com".to_string(),
            created_at: chrono::Utc::now(),
            started_at: None,
            ended_at: None,
            status: ExecutionStatus::Created,
            stages: Vec::new(),
            node_results: Vec::new(),
            trace_id: "trace-1".to_string(),
            force: false,
            metadata: serde_json::json!({
                "artifact": {
                    "reference": "registry.example.com/payments-api:2.0.0",
                    "digest": "sha256:deadbeef",
                    "signature": "sig",
                }
            }),
        }
    }

    fn build_executor(
        executions: Arc<FakeExecutionRepo>,
        registry: ClusterRegistry,
        node_client: Arc<MockNodeClient>,
    ) -> PipelineExecutor {
        PipelineExecutor {
            executions,
            approvals: Arc::new(FakeApprovalRepo),
            jobs: Arc::new(FakeJobRepo),
            registry,
            node_client,
            verifier: Arc::new(AlwaysVerifies),
            events: Arc::new(rollout_core::event::NullSink),
            lock: Arc::new(FakeLock),
            strategies: StrategyParams::default(),
        }
    }

    fn dummy_lock_handle() -> LockHandle {
        LockHandle {
            name: "deploy:development:payments-api".to_string(),
            owner_id: "test".to_string(),
            fencing_token: 1,
            expires_at: chrono::Utc::now() + chrono::Duration::minutes(5),
        }
    }

    #[tokio::test]
    async fn direct_deploy_succeeds_and_commits_versions() {
        let nodes = vec![test_node("1.0.0"), test_node("1.0.0"), test_node("1.0.0")];
        let execution = test_execution(StrategyKind::Direct);
        let execution_id = execution.id;
        let registry = ClusterRegistry::from_nodes(nodes.clone());
        let executions = Arc::new(FakeExecutionRepo::seeded(execution));
        let node_client = Arc::new(MockNodeClient::new());
        let executor = build_executor(executions.clone(), registry.clone(), node_client);

        let policy = EnvironmentPolicy::default_for(Environment::Development);
        let status = executor
            .run(execution_id, ResourceId::new(), dummy_lock_handle(), &policy)
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Succeeded);
        for node in &nodes {
            let committed = registry.get_node(node.id).await.unwrap();
            assert_eq!(
                committed.current_versions.get("payments-api").unwrap(),
                &Version::parse("2.0.0").unwrap()
            );
        }
    }

    #[tokio::test]
    async fn direct_deploy_failure_rolls_back_and_leaves_versions_untouched() {
        let nodes = vec![test_node("1.0.0"), test_node("1.0.0")];
        let failing = nodes[0].id;
        let execution = test_execution(StrategyKind::Direct);
        let execution_id = execution.id;
        let registry = ClusterRegistry::from_nodes(nodes.clone());
        let executions = Arc::new(FakeExecutionRepo::seeded(execution));
        let node_client = Arc::new(MockNodeClient::new());
        node_client.script(failing, Scripted::FailPermanent);
        let executor = build_executor(executions.clone(), registry.clone(), node_client);

        let policy = EnvironmentPolicy::default_for(Environment::Development);
        let status = executor
            .run(execution_id, ResourceId::new(), dummy_lock_handle(), &policy)
            .await
            .unwrap();

        assert!(matches!(
            status,
            ExecutionStatus::RolledBack | ExecutionStatus::RolledBackWithErrors
        ));
        for node in &nodes {
            let committed = registry.get_node(node.id).await.unwrap();
            assert_eq!(
                committed.current_versions.get("payments-api").unwrap(),
                &Version::parse("1.0.0").unwrap()
            );
        }
    }
}
