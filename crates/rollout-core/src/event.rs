//! Audit/event sink (C11): a single append-only interface the core emits
//! into. The core does not depend on any specific backend — persistence,
//! metrics, and tracing are all fan-out targets implemented elsewhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approval::ApprovalStatus;
use crate::execution::{ExecutionStatus, NodeResult, StageName, StageStatus};
use crate::id::ResourceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    DeploymentStarted {
        module_name: String,
        version: String,
        environment: String,
        strategy: String,
    },
    StageStarted {
        stage: StageName,
    },
    StageEnded {
        stage: StageName,
        status: StageStatus,
        message: Option<String>,
    },
    NodeResultRecorded {
        result: Box<NodeResult>,
    },
    ApprovalRequested {
        approval_id: ResourceId,
        timeout_at: chrono::DateTime<chrono::Utc>,
    },
    ApprovalDecided {
        approval_id: ResourceId,
        status: ApprovalStatus,
        by_email: Option<String>,
    },
    ApprovalExpired {
        approval_id: ResourceId,
    },
    RollbackStarted {
        reason: String,
    },
    PolicyViolation {
        reason: String,
    },
    DeploymentTerminal {
        status: ExecutionStatus,
        message: Option<String>,
    },
}

/// One audit record. Always scoped to a single DeploymentExecution so that
/// ordering-within-execution is trivially preserved by append order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub trace_id: String,
    pub span_id: String,
    pub deployment_execution_id: ResourceId,
    pub payload: EventPayload,
}

/// Fan-out sink: durable store, metrics counters, tracing spans. The core
/// only ever calls `emit`; it never reads events back.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

/// A sink that does nothing, for components (and tests) that don't care
/// about the audit trail.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: Event) {}
}
