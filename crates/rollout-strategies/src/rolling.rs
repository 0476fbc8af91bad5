//! Rolling strategy (§4.8): sequential batches, each followed by a
//! stabilization window; on failure, rollback every already-deployed node
//! in reverse order.

use async_trait::async_trait;
use rollout_core::execution::{NodeResult, NodeResultStatus};
use rollout_core::node::{Node, NodeClient};
use rollout_core::Result;
use std::time::Duration;

use crate::apply::{apply_batch, rollback_batch, ApplyArgs};
use crate::control::StrategyControl;
use crate::health::observe_window;
use crate::params::RollingParams;
use crate::{Strategy, StrategyInput, StrategyOutcome};

pub struct RollingStrategy {
    pub params: RollingParams,
}

impl RollingStrategy {
    pub fn new(params: RollingParams) -> Self {
        Self { params }
    }

    fn batch_size(&self, n: usize) -> usize {
        match self.params.batch_size {
            Some(size) => size.max(1),
            None => ((n as f64) / 5.0).ceil().max(1.0) as usize,
        }
    }
}

#[async_trait]
impl Strategy for RollingStrategy {
    async fn execute(
        &self,
        input: StrategyInput<'_>,
        node_client: &dyn NodeClient,
        control: &dyn StrategyControl,
    ) -> Result<StrategyOutcome> {
        let batch_size = self.batch_size(input.nodes.len());
        let batches: Vec<Vec<Node>> = input
            .nodes
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();

        let args = ApplyArgs {
            execution_id: input.execution_id,
            module_name: input.module_name,
            target_version: input.target_version,
            artifact_digest: input.artifact_digest,
            signature: input.signature,
        };

        let mut all_results: Vec<NodeResult> = Vec::new();
        let mut deployed: Vec<(Node, rollout_core::module::Version)> = Vec::new();

        for (batch_index, batch) in batches.iter().enumerate() {
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

            if failed {
                return Ok(rollback_and_fail(
                    node_client,
                    &input,
                    all_results,
                    deployed,
                    format!("batch {batch_index} had a node failure"),
                )
                .await);
            }

            control
                .checkpoint(serde_json::json!({ "batch_index": batch_index, "deployed_count": deployed.len() }))
                .await?;

            tokio::time::sleep(Duration::from_secs(self.params.stabilization_seconds)).await;
            let snapshots = observe_window(
                batch,
                node_client,
                self.params.health_samples,
                Duration::from_secs(self.params.sample_interval_seconds),
            )
            .await?;
            let stable = snapshots
                .iter()
                .all(|s| s.healthy_ratio >= self.params.healthy_threshold);

            if !stable {
                return Ok(rollback_and_fail(
                    node_client,
                    &input,
                    all_results,
                    deployed,
                    format!("batch {batch_index} failed stabilization"),
                )
                .await);
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
    mut deployed: Vec<(Node, rollout_core::module::Version)>,
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

    fn fast_params() -> RollingParams {
        RollingParams {
            batch_size: Some(2),
            stabilization_seconds: 0,
            health_samples: 1,
            sample_interval_seconds: 0,
            healthy_threshold: 1.0,
        }
    }

    fn input<'a>(nodes: Vec<Node>, target: &'a rollout_core::module::Version) -> StrategyInput<'a> {
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
    async fn rolls_through_every_batch() {
        let strategy = RollingStrategy::new(fast_params());
        let client = MockNodeClient::new();
        let control = NoopControl::default();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(nodes(5, "1.0.0"), &target), &client, &control)
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.node_results.len(), 5);
    }

    #[tokio::test]
    async fn batch_failure_rolls_back_prior_batches() {
        let strategy = RollingStrategy::new(fast_params());
        let client = MockNodeClient::new();
        let batch_nodes = nodes(4, "1.0.0");
        client.script(batch_nodes[3].id, Scripted::FailPermanent);
        let control = NoopControl::default();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(batch_nodes, &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        let rolled_back = outcome
            .node_results
            .iter()
            .filter(|r| r.status == NodeResultStatus::RolledBack)
            .count();
        assert_eq!(rolled_back, 2);
    }

    #[tokio::test]
    async fn unhealthy_batch_fails_stabilization() {
        let strategy = RollingStrategy::new(fast_params());
        let client = MockNodeClient::new();
        let batch_nodes = nodes(2, "1.0.0");
        client.set_health(batch_nodes[0].id, rollout_core::node::HealthStatus::Unhealthy);
        let control = NoopControl::default();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(batch_nodes, &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert!(outcome
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("stabilization"));
    }
}
