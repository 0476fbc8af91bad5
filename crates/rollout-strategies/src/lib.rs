//! The four sealed rollout strategies (C8): Direct, Rolling, Blue/Green,
//! Canary. Each implements the common `Strategy` contract against a node
//! set, a `NodeClient`, and a `StrategyControl` that exposes cancellation
//! and approval suspension back to the pipeline executor.

pub mod apply;
pub mod blue_green;
pub mod canary;
pub mod control;
pub mod direct;
pub mod health;
pub mod params;
pub mod rolling;
#[cfg(test)]
mod testutil;

pub use blue_green::BlueGreenStrategy;
pub use canary::CanaryStrategy;
pub use control::{ApprovalOutcome, StrategyControl};
pub use direct::DirectStrategy;
pub use params::StrategyParams;
pub use rolling::RollingStrategy;

use async_trait::async_trait;
use rollout_core::execution::NodeResult;
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use rollout_core::node::{Node, NodeClient};
use rollout_core::Result;

/// Input to one Deploy-stage execution: the target module/version, the
/// nodes in scope, and the per-node versions to roll back to if the stage
/// fails.
pub struct StrategyInput<'a> {
    pub execution_id: ResourceId,
    pub module_name: &'a str,
    pub artifact_digest: &'a str,
    pub signature: &'a str,
    pub target_version: &'a Version,
    pub nodes: Vec<Node>,
}

/// Outcome of a Deploy-stage execution: every node result produced, in the
/// order they completed, plus whether the stage as a whole succeeded.
pub struct StrategyOutcome {
    pub succeeded: bool,
    pub node_results: Vec<NodeResult>,
    pub failure_reason: Option<String>,
}

#[async_trait]
pub trait Strategy: Send + Sync {
    async fn execute(
        &self,
        input: StrategyInput<'_>,
        node_client: &dyn NodeClient,
        control: &dyn StrategyControl,
    ) -> Result<StrategyOutcome>;
}
