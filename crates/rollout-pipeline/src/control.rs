//! `StrategyControl` implementation backing the Deploy stage. Cancellation
//! is a polled flag fed by a background watcher over the owning job;
//! approval suspension is backed by the approval-request repo with a
//! bounded poll loop (the actual expiry is done by the sweeper in
//! `rollout-scheduler`, not here).

use async_trait::async_trait;
use rollout_core::approval::{ApprovalRequest, ApprovalStatus};
use rollout_core::environment::Environment;
use rollout_core::execution::{Stage, StageName, StageStatus};
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use rollout_core::{Error, Result};
use rollout_db::{ApprovalRepo, ExecutionRepo};
use rollout_strategies::{ApprovalOutcome, StrategyControl};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const APPROVAL_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct PipelineControl {
    pub execution_id: ResourceId,
    pub module_name: String,
    pub version: Version,
    pub environment: Environment,
    pub requester_email: String,
    pub approver_emails: Vec<String>,
    pub approval_ttl: chrono::Duration,
    pub executions: Arc<dyn ExecutionRepo>,
    pub approvals: Arc<dyn ApprovalRepo>,
    pub cancelled: Arc<AtomicBool>,
    pub stage_name: StageName,
}

#[async_trait]
impl StrategyControl for PipelineControl {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn await_approval(&self, _context: serde_json::Value) -> Result<ApprovalOutcome> {
        let request = match self.approvals.get_for_execution(self.execution_id).await? {
            Some(existing) if existing.status == ApprovalStatus::Pending => existing,
            Some(existing) => existing,
            None => {
                let now = chrono::Utc::now();
                let request = ApprovalRequest {
                    id: ResourceId::new(),
                    deployment_execution_id: self.execution_id,
                    module_name: self.module_name.clone(),
                    version: self.version.clone(),
                    environment: self.environment,
                    requester_email: self.requester_email.clone(),
                    approver_emails: self.approver_emails.clone(),
                    status: ApprovalStatus::Pending,
                    requested_at: now,
                    timeout_at: now + self.approval_ttl,
                    responded_at: None,
                    responded_by_email: None,
                    response_reason: None,
                };
                self.approvals.create(&request).await?;
                request
            }
        };

        loop {
            let current = self.approvals.get(request.id).await?;
            match current.status {
                ApprovalStatus::Pending => {
                    if self.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    tokio::time::sleep(APPROVAL_POLL_INTERVAL).await;
                }
                ApprovalStatus::Approved => return Ok(ApprovalOutcome::Approved),
                ApprovalStatus::Rejected => return Ok(ApprovalOutcome::Rejected),
                ApprovalStatus::Expired => return Ok(ApprovalOutcome::Expired),
            }
        }
    }

    async fn checkpoint(&self, context: serde_json::Value) -> Result<()> {
        let stage = Stage {
            name: self.stage_name,
            status: StageStatus::Running,
            started_at: Some(chrono::Utc::now()),
            ended_at: None,
            message: None,
            context,
        };
        self.executions
            .append_stage(self.execution_id, &stage)
            .await
            .map_err(Into::into)
    }
}
