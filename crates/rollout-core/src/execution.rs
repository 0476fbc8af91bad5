//! The DeploymentExecution aggregate and its state machine (C9 data model).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::environment::Environment;
use crate::id::ResourceId;
use crate::module::{ModuleName, Version};
use crate::node::NodeId;
use crate::strategy::StrategyKind;

/// Status of a DeploymentExecution. Transitions are validated by
/// `ExecutionStatus::can_transition_to` and enforced by the pipeline
/// executor; once terminal the record is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Created,
    Validating,
    Verifying,
    AwaitingApproval,
    Deploying,
    Stabilizing,
    RollingBack,
    Succeeded,
    Failed,
    RolledBack,
    RolledBackWithErrors,
    RejectedApproval,
    Expired,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded
                | ExecutionStatus::Failed
                | ExecutionStatus::RolledBack
                | ExecutionStatus::RolledBackWithErrors
                | ExecutionStatus::RejectedApproval
                | ExecutionStatus::Expired
                | ExecutionStatus::Cancelled
        )
    }

    /// Validates the state machine described in the pipeline executor design:
    /// Created -> Validating -> Verifying -> [AwaitingApproval ->] Deploying
    ///   -> Stabilizing -> Succeeded
    /// Deploying | Stabilizing -> RollingBack -> RolledBack[WithErrors]
    /// Validating | Verifying -> Failed
    /// AwaitingApproval -> RejectedApproval | Expired
    /// * -> Cancelled (only before a terminal state)
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }
        matches!(
            (self, next),
            (Created, Validating)
                | (Validating, Verifying)
                | (Validating, Failed)
                | (Verifying, AwaitingApproval)
                | (Verifying, Deploying)
                | (Verifying, Failed)
                | (AwaitingApproval, Deploying)
                | (AwaitingApproval, RejectedApproval)
                | (AwaitingApproval, Expired)
                | (Deploying, Stabilizing)
                | (Deploying, RollingBack)
                | (Stabilizing, Succeeded)
                | (Stabilizing, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RolledBackWithErrors)
        )
    }
}

/// The seven resumable stages of the pipeline (Commit folds into
/// Stabilizing -> Succeeded in the persisted stage list as "commit").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Validate,
    Verify,
    PreflightHealth,
    Approve,
    Deploy,
    Stabilize,
    Commit,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// A single append-only stage record. `context` carries whatever a resumable
/// decision point needs to pick up on a different worker (e.g. batch index,
/// already-deployed node list) serialized as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub name: StageName,
    pub status: StageStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub message: Option<String>,
    pub context: serde_json::Value,
}

impl Stage {
    pub fn pending(name: StageName) -> Self {
        Self {
            name,
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            message: None,
            context: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeResultStatus {
    Success,
    Failed,
    RolledBack,
    RollbackFailed,
}

/// Outcome of applying (or rolling back) the module on one node within one
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub node_id: NodeId,
    pub from_version: Option<Version>,
    pub to_version: Version,
    pub status: NodeResultStatus,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub rolled_back: bool,
}

/// The DeploymentExecution aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentExecution {
    pub id: ResourceId,
    pub module_name: ModuleName,
    pub target_version: Version,
    /// Per-node version snapshotted before Deploy starts, for rollback.
    pub previous_versions: HashMap<NodeId, Version>,
    pub environment: Environment,
    pub strategy: StrategyKind,
    pub requester_email: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: ExecutionStatus,
    pub stages: Vec<Stage>,
    pub node_results: Vec<NodeResult>,
    pub trace_id: String,
    pub force: bool,
    pub metadata: serde_json::Value,
}

impl DeploymentExecution {
    pub fn stage_mut(&mut self, name: StageName) -> Option<&mut Stage> {
        self.stages.iter_mut().rev().find(|s| s.name == name)
    }
}

/// A command accepted by the facade (C10 entry point).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeploymentCommand {
    pub module_name: String,
    pub version: String,
    pub target_environment: Environment,
    pub requester_email: String,
    pub require_approval: Option<bool>,
    pub strategy: Option<StrategyKind>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub force: bool,
    /// Caller-supplied key for idempotency; if absent the facade derives one
    /// from (module, version, env, requester).
    pub client_idempotency_key: Option<String>,
}
