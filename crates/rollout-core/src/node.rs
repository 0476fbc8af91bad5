//! Node client abstraction (C1): the contract the orchestration core uses to
//! apply, roll back, and health-check a module on a single node. Concrete
//! transports (HTTP, a mock for tests) live in `rollout-node`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::id::ResourceId;
use crate::module::Version;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Degraded,
    Unhealthy,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}

/// A node in the cluster registry, as declared in the static environment
/// config supplied at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub environment: crate::environment::Environment,
    /// Module name -> currently applied version, updated only by the
    /// pipeline's Commit stage.
    pub current_versions: std::collections::HashMap<String, Version>,
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
    pub health: HealthStatus,
    /// Blue/Green pool membership, if the environment uses that strategy.
    pub pool: Option<Pool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pool {
    Blue,
    Green,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub ResourceId);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A snapshot of a node's live health, as returned by `NodeClient::health_check`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HealthSample {
    pub status: HealthStatus,
    pub latency_ms: u32,
    pub error_rate_pct: f64,
    pub cpu_pct: f64,
    pub mem_pct: f64,
}

/// Outcome of applying or rolling back a module on a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeApplyResult {
    pub duration_ms: u64,
    pub applied_version: Version,
}

/// The contract node agents expose to the core. All operations are
/// idempotent keyed by (execution id, node id): re-issuing the same call
/// must never double-apply.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn deploy(
        &self,
        execution_id: ResourceId,
        node: &Node,
        module: &str,
        version: &Version,
        artifact_digest: &str,
        signature: &str,
    ) -> Result<NodeApplyResult>;

    async fn rollback(
        &self,
        execution_id: ResourceId,
        node: &Node,
        module: &str,
        to_version: &Version,
    ) -> Result<NodeApplyResult>;

    async fn health_check(&self, node: &Node, timeout: Duration) -> Result<HealthSample>;
}

/// Maps node-client transport failures onto the taxonomy a strategy can act
/// on: NetworkError/ResourceExhausted are retryable, VerificationError and
/// IncompatibleVersion are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFailureKind {
    NetworkError,
    VerificationError,
    IncompatibleVersion,
    ResourceExhausted,
}

impl NodeFailureKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeFailureKind::NetworkError | NodeFailureKind::ResourceExhausted
        )
    }

    pub fn into_error(self, message: impl Into<String>) -> Error {
        let message = message.into();
        if self.is_retryable() {
            Error::NodeTransient(message)
        } else {
            Error::NodePermanent(message)
        }
    }
}
