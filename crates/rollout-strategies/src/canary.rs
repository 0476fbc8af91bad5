//! Canary strategy (§4.8): progressive percentage steps, node selection by
//! stable hash of node id, health/SLI observation per step, rollback of
//! every upgraded node (reverse order) on the first failed step.

use async_trait::async_trait;
use rollout_core::execution::{NodeResult, NodeResultStatus};
use rollout_core::module::Version;
use rollout_core::node::{Node, NodeClient, NodeId};
use rollout_core::Result;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::apply::{apply_batch, rollback_batch, ApplyArgs};
use crate::control::{ApprovalOutcome, StrategyControl};
use crate::health::observe_window;
use crate::params::CanaryParams;
use crate::{Strategy, StrategyInput, StrategyOutcome};

pub struct CanaryStrategy {
    pub params: CanaryParams,
}

impl CanaryStrategy {
    pub fn new(params: CanaryParams) -> Self {
        Self { params }
    }
}

fn stable_hash(node_id: NodeId) -> u64 {
    let mut hasher = DefaultHasher::new();
    node_id.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl Strategy for CanaryStrategy {
    async fn execute(
        &self,
        input: StrategyInput<'_>,
        node_client: &dyn NodeClient,
        control: &dyn StrategyControl,
    ) -> Result<StrategyOutcome> {
        let n = input.nodes.len();
        let mut ordered = input.nodes.clone();
        ordered.sort_by_key(|node| stable_hash(node.id));

        let args = ApplyArgs {
            execution_id: input.execution_id,
            module_name: input.module_name,
            target_version: input.target_version,
            artifact_digest: input.artifact_digest,
            signature: input.signature,
        };

        let mut all_results: Vec<NodeResult> = Vec::new();
        let mut deployed: Vec<(Node, Version)> = Vec::new();
        let mut upgraded_count = 0usize;

        for (step_index, pct) in self.params.steps.iter().enumerate() {
            if control.is_cancelled() {
                return Ok(rollback_and_fail(
                    node_client,
                    &input,
                    all_results,
                    deployed,
                    "cancelled".into(),
                )
                .await);
            }

            let target_count = ((*pct as f64 / 100.0) * n as f64).ceil() as usize;
            let target_count = target_count.min(n);
            if target_count <= upgraded_count {
                continue;
            }
            let batch = &ordered[upgraded_count..target_count];

            let batch_results = apply_batch(batch, node_client, &args, batch.len()).await;
            let failed = batch_results
                .iter()
                .any(|r| r.status == NodeResultStatus::Failed);

            for (node, result) in batch.iter().zip(batch_results.iter()) {
                if result.status == NodeResultStatus::Success {
                    deployed.push((
                        node.clone(),
                        result
                            .from_version
                            .clone()
                            .unwrap_or_else(|| input.target_version.clone()),
                    ));
                }
            }
            all_results.extend(batch_results);
            upgraded_count = target_count;

            if failed {
                return Ok(rollback_and_fail(
                    node_client,
                    &input,
                    all_results,
                    deployed,
                    format!("step {pct}% had a node failure"),
                )
                .await);
            }

            control
                .checkpoint(serde_json::json!({
                    "step_index": step_index,
                    "percent": pct,
                    "upgraded_count": upgraded_count,
                }))
                .await?;

            let already_upgraded: Vec<Node> = ordered[..upgraded_count].to_vec();
            let snapshots = observe_window(
                &already_upgraded,
                node_client,
                (self.params.step_observation_seconds / self.params.sample_interval_seconds.max(1)) as u32,
                Duration::from_secs(self.params.sample_interval_seconds),
            )
            .await?;
            let within_budget = snapshots.iter().all(|s| {
                s.error_rate_pct <= self.params.error_rate_budget_pct
                    && s.p95_latency_ms <= self.params.latency_budget_ms
            });

            if !within_budget {
                return Ok(rollback_and_fail(
                    node_client,
                    &input,
                    all_results,
                    deployed,
                    format!("step {pct}% exceeded error-rate or latency budget"),
                )
                .await);
            }

            let is_last_partial_step = *pct != 100 && step_index + 1 < self.params.steps.len()
                && self.params.steps[step_index + 1] == 100;
            if is_last_partial_step && self.params.requires_approval_before_full {
                match control
                    .await_approval(serde_json::json!({ "step_index": step_index, "percent": pct }))
                    .await?
                {
                    ApprovalOutcome::Approved => {}
                    ApprovalOutcome::Rejected => {
                        return Ok(rollback_and_fail(
                            node_client,
                            &input,
                            all_results,
                            deployed,
                            "canary promotion rejected by approver".into(),
                        )
                        .await);
                    }
                    ApprovalOutcome::Expired => {
                        return Ok(rollback_and_fail(
                            node_client,
                            &input,
                            all_results,
                            deployed,
                            "canary promotion approval expired".into(),
                        )
                        .await);
                    }
                }
            }
        }

        Ok(StrategyOutcome {
            succeeded: true,
            node_results: all_results,
            failure_reason: None,
        })
    }
}

async fn rollback_and_fail(
    node_client: &dyn NodeClient,
    input: &StrategyInput<'_>,
    mut all_results: Vec<NodeResult>,
    mut deployed: Vec<(Node, Version)>,
    reason: String,
) -> StrategyOutcome {
    deployed.reverse();
    let rollback_results =
        rollback_batch(&deployed, node_client, input.execution_id, input.module_name).await;
    all_results.extend(rollback_results);
    StrategyOutcome {
        succeeded: false,
        node_results: all_results,
        failure_reason: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{nodes, version, NoopControl};
    use rollout_core::id::ResourceId;
    use rollout_node::mock::{MockNodeClient, Scripted};

    fn fast_params(steps: Vec<u8>) -> CanaryParams {
        CanaryParams {
            steps,
            step_observation_seconds: 0,
            sample_interval_seconds: 0,
            error_rate_budget_pct: 1.0,
            latency_budget_ms: 500,
            requires_approval_before_full: false,
        }
    }

    fn input<'a>(nodes: Vec<Node>, target: &'a Version) -> StrategyInput<'a> {
        StrategyInput {
            execution_id: ResourceId::new_v4(),
            module_name: "payments-api",
            artifact_digest: "sha256:deadbeef",
            signature: "sig",
            target_version: target,
            nodes,
        }
    }

    #[tokio::test]
    async fn progresses_through_every_step() {
        let strategy = CanaryStrategy::new(fast_params(vec![50, 100]));
        let client = MockNodeClient::new();
        let control = NoopControl::default();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(nodes(4, "1.0.0"), &target), &client, &control)
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.node_results.len(), 4);
    }

    #[tokio::test]
    async fn step_failure_rolls_back_upgraded_nodes() {
        let strategy = CanaryStrategy::new(fast_params(vec![25, 100]));
        let client = MockNodeClient::new();
        let control = NoopControl::default();
        let target = version("2.0.0");
        let batch_nodes = nodes(4, "1.0.0");
        // step 1 (25%) upgrades exactly one node, which will fail.
        let sorted_by_hash = {
            let mut ns = batch_nodes.clone();
            ns.sort_by_key(|n| stable_hash(n.id));
            ns
        };
        client.script(sorted_by_hash[0].id, Scripted::FailPermanent);

        let outcome = strategy
            .execute(input(batch_nodes, &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
    }

    #[tokio::test]
    async fn stable_hash_selection_is_deterministic_across_runs() {
        let batch_nodes = nodes(4, "1.0.0");
        let mut first: Vec<_> = batch_nodes.iter().map(|n| stable_hash(n.id)).collect();
        let mut second = first.clone();
        first.sort_unstable();
        second.sort_unstable();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn approval_required_before_final_step_can_be_rejected() {
        let strategy = CanaryStrategy::new(CanaryParams {
            requires_approval_before_full: true,
            ..fast_params(vec![50, 100])
        });
        let client = MockNodeClient::new();
        let control = NoopControl::rejecting();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(nodes(4, "1.0.0"), &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert!(outcome
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("rejected"));
    }
}
