//! Test-only node/version fixtures shared across the strategy test modules.
#![cfg(test)]

use rollout_core::environment::Environment;
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use rollout_core::node::{HealthStatus, Node, NodeId, Pool};
use std::collections::HashMap;

pub fn version(s: &str) -> Version {
    Version::parse(s).unwrap()
}

pub fn node(current: &str, pool: Option<Pool>) -> Node {
    let mut current_versions = HashMap::new();
    current_versions.insert("payments-api".to_string(), version(current));
    Node {
        id: NodeId(ResourceId::new()),
        hostname: "node.example".to_string(),
        environment: Environment::Staging,
        current_versions,
        last_heartbeat: None,
        health: HealthStatus::Healthy,
        pool,
    }
}

pub fn nodes(n: usize, current: &str) -> Vec<Node> {
    (0..n).map(|_| node(current, None)).collect()
}

pub fn pooled_nodes(n_blue: usize, n_green: usize, current: &str) -> Vec<Node> {
    let mut out: Vec<Node> = (0..n_blue).map(|_| node(current, Some(Pool::Blue))).collect();
    out.extend((0..n_green).map(|_| node(current, Some(Pool::Green))));
    out
}

use crate::control::{ApprovalOutcome, StrategyControl};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// A `StrategyControl` that never cancels and approves every request —
/// the default for tests that aren't exercising suspension directly.
#[derive(Default)]
pub struct NoopControl {
    pub cancelled: AtomicBool,
    pub approval: Option<ApprovalOutcome>,
}

impl NoopControl {
    pub fn cancelled() -> Self {
        Self {
            cancelled: AtomicBool::new(true),
            approval: None,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            approval: Some(ApprovalOutcome::Rejected),
        }
    }
}

#[async_trait]
impl StrategyControl for NoopControl {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn await_approval(&self, _context: serde_json::Value) -> rollout_core::Result<ApprovalOutcome> {
        Ok(self.approval.unwrap_or(ApprovalOutcome::Approved))
    }

    async fn checkpoint(&self, _context: serde_json::Value) -> rollout_core::Result<()> {
        Ok(())
    }
}
