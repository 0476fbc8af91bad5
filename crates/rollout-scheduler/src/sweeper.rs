//! Background sweepers: reclaim jobs and messages whose lease expired
//! without the worker completing them, and expire approval requests whose
//! timeout has elapsed with no decision (§4.7, default interval 5 minutes).

use std::sync::Arc;
use std::time::Duration;

use rollout_core::event::{Event, EventPayload, EventSink};
use rollout_core::id::ResourceId;
use rollout_db::{ApprovalRepo, JobRepo, MessageRepo};
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_LEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_APPROVAL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct Sweeper {
    jobs: Arc<dyn JobRepo>,
    messages: Arc<dyn MessageRepo>,
    approvals: Arc<dyn ApprovalRepo>,
    events: Arc<dyn EventSink>,
    lease_sweep_interval: Duration,
    approval_sweep_interval: Duration,
}

impl Sweeper {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        messages: Arc<dyn MessageRepo>,
        approvals: Arc<dyn ApprovalRepo>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            jobs,
            messages,
            approvals,
            events,
            lease_sweep_interval: DEFAULT_LEASE_SWEEP_INTERVAL,
            approval_sweep_interval: DEFAULT_APPROVAL_SWEEP_INTERVAL,
        }
    }

    /// Runs both sweep loops until cancelled; callers typically spawn this.
    pub async fn run(self: Arc<Self>) {
        let leases = self.clone();
        let approvals = self.clone();
        tokio::join!(leases.run_lease_sweep(), approvals.run_approval_sweep());
    }

    async fn run_lease_sweep(&self) {
        loop {
            match self.jobs.sweep_expired_leases().await {
                Ok(n) if n > 0 => info!(count = n, "reclaimed expired job leases"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "job lease sweep failed"),
            }
            match self.messages.sweep_expired_leases().await {
                Ok(n) if n > 0 => info!(count = n, "reclaimed expired message leases"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "message lease sweep failed"),
            }
            sleep(self.lease_sweep_interval).await;
        }
    }

    async fn run_approval_sweep(&self) {
        loop {
            match self.approvals.expire_overdue().await {
                Ok(execution_ids) => {
                    for execution_id in execution_ids {
                        self.emit_expired(execution_id).await;
                    }
                }
                Err(e) => warn!(error = %e, "approval expiry sweep failed"),
            }
            sleep(self.approval_sweep_interval).await;
        }
    }

    async fn emit_expired(&self, deployment_execution_id: ResourceId) {
        self.events
            .emit(Event {
                timestamp: chrono::Utc::now(),
                trace_id: String::new(),
                span_id: ResourceId::new().to_string(),
                deployment_execution_id,
                payload: EventPayload::ApprovalExpired {
                    approval_id: deployment_execution_id,
                },
            })
            .await;
    }
}
