//! The suspension/cancellation contract strategies are driven through.
//! Implemented by `rollout-pipeline`, which owns the durable approval and
//! cancellation-flag state; strategies never touch the database directly.

use async_trait::async_trait;
use rollout_core::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    Expired,
}

#[async_trait]
pub trait StrategyControl: Send + Sync {
    /// True once an external cancel request has been observed. Strategies
    /// check this between nodes within a batch, between batches, and
    /// between canary steps — never mid-apply.
    fn is_cancelled(&self) -> bool;

    /// Suspend until an approval request tied to this execution resolves.
    /// `context` is opaque data the pipeline persists so the suspension
    /// survives a worker restart (e.g. which strategy step is waiting).
    async fn await_approval(&self, context: serde_json::Value) -> Result<ApprovalOutcome>;

    /// Record resumable progress (e.g. batch index, nodes already
    /// upgraded) so a crash mid-strategy can resume from this point rather
    /// than from the start of the stage.
    async fn checkpoint(&self, context: serde_json::Value) -> Result<()>;
}
