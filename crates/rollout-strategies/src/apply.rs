//! Bounded-parallel apply/rollback helpers shared by Direct, Rolling and
//! Canary (Blue/Green never applies per-node; it flips a pointer).

use futures::stream::{FuturesUnordered, StreamExt};
use rollout_core::execution::{NodeResult, NodeResultStatus};
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use rollout_core::node::{Node, NodeClient};
use rollout_core::Error;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ApplyArgs<'a> {
    pub execution_id: ResourceId,
    pub module_name: &'a str,
    pub target_version: &'a Version,
    pub artifact_digest: &'a str,
    pub signature: &'a str,
}

/// Applies `target_version` to every node in `batch` with at most
/// `concurrency` in flight, returning one `NodeResult` per node in
/// completion order.
pub async fn apply_batch(
    batch: &[Node],
    node_client: &dyn NodeClient,
    args: &ApplyArgs<'_>,
    concurrency: usize,
) -> Vec<NodeResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut futures = FuturesUnordered::new();

    for node in batch {
        let permit = semaphore.clone();
        let node = node.clone();
        let from_version = node.current_versions.get(args.module_name).cloned();
        futures.push(async move {
            let _permit = permit.acquire_owned().await;
            let outcome = node_client
                .deploy(
                    args.execution_id,
                    &node,
                    args.module_name,
                    args.target_version,
                    args.artifact_digest,
                    args.signature,
                )
                .await;
            node_result(node.id, from_version, args.target_version.clone(), outcome)
        });
    }

    let mut results = Vec::with_capacity(batch.len());
    while let Some(result) = futures.next().await {
        results.push(result);
    }
    results
}

/// Rolls back every node in `batch` to its recorded `from_version`, in the
/// order given (callers pass already-deployed nodes in reverse-upgrade
/// order per the rollback-completeness invariant).
pub async fn rollback_batch(
    batch: &[(Node, Version)],
    node_client: &dyn NodeClient,
    execution_id: ResourceId,
    module_name: &str,
) -> Vec<NodeResult> {
    let mut results = Vec::with_capacity(batch.len());
    for (node, rollback_to) in batch {
        let deployed_version = node.current_versions.get(module_name).cloned();
        let outcome = node_client
            .rollback(execution_id, node, module_name, rollback_to)
            .await;
        let result = match outcome {
            Ok(apply) => NodeResult {
                node_id: node.id,
                from_version: deployed_version,
                to_version: apply.applied_version,
                status: NodeResultStatus::RolledBack,
                duration_ms: Some(apply.duration_ms),
                error: None,
                retry_count: 0,
                rolled_back: true,
            },
            Err(e) => NodeResult {
                node_id: node.id,
                from_version: deployed_version,
                to_version: rollback_to.clone(),
                status: NodeResultStatus::RollbackFailed,
                duration_ms: None,
                error: Some(e.to_string()),
                retry_count: 0,
                rolled_back: false,
            },
        };
        results.push(result);
    }
    results
}

fn node_result(
    node_id: rollout_core::node::NodeId,
    from_version: Option<Version>,
    to_version: Version,
    outcome: Result<rollout_core::node::NodeApplyResult, Error>,
) -> NodeResult {
    match outcome {
        Ok(applied) => NodeResult {
            node_id,
            from_version,
            to_version: applied.applied_version,
            status: NodeResultStatus::Success,
            duration_ms: Some(applied.duration_ms),
            error: None,
            retry_count: 0,
            rolled_back: false,
        },
        Err(e) => NodeResult {
            node_id,
            from_version,
            to_version,
            status: NodeResultStatus::Failed,
            duration_ms: None,
            error: Some(e.to_string()),
            retry_count: 0,
            rolled_back: false,
        },
    }
}
