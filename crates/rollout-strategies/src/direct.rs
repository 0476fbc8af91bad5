//! Direct strategy (§4.8): apply to every node concurrently, bounded by
//! `directConcurrency`. Any failure rolls back whatever already succeeded.
//! No health gating between nodes.

use async_trait::async_trait;
use rollout_core::execution::NodeResultStatus;
use rollout_core::node::NodeClient;
use rollout_core::Result;

use crate::apply::{apply_batch, rollback_batch, ApplyArgs};
use crate::control::StrategyControl;
use crate::params::DirectParams;
use crate::{Strategy, StrategyInput, StrategyOutcome};

pub struct DirectStrategy {
    pub params: DirectParams,
}

impl DirectStrategy {
    pub fn new(params: DirectParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Strategy for DirectStrategy {
    async fn execute(
        &self,
        input: StrategyInput<'_>,
        node_client: &dyn NodeClient,
        control: &dyn StrategyControl,
    ) -> Result<StrategyOutcome> {
        let args = ApplyArgs {
            execution_id: input.execution_id,
            module_name: input.module_name,
            target_version: input.target_version,
            artifact_digest: input.artifact_digest,
            signature: input.signature,
        };

        let results = apply_batch(
            &input.nodes,
            node_client,
            &args,
            self.params.concurrency.min(input.nodes.len().max(1)),
        )
        .await;

        let failed: Vec<_> = results
            .iter()
            .filter(|r| r.status == NodeResultStatus::Failed)
            .collect();

        if failed.is_empty() && !control.is_cancelled() {
            return Ok(StrategyOutcome {
                succeeded: true,
                node_results: results,
                failure_reason: None,
            });
        }

        let failure_reason = if control.is_cancelled() {
            "cancelled".to_string()
        } else {
            format!("{} of {} nodes failed to apply", failed.len(), results.len())
        };

        let succeeded_nodes: Vec<_> = input
            .nodes
            .iter()
            .zip(results.iter())
            .filter(|(_, r)| r.status == NodeResultStatus::Success)
            .map(|(node, r)| (node.clone(), r.from_version.clone().unwrap_or_else(|| input.target_version.clone())))
            .collect();

        let mut final_results = results;
        if !succeeded_nodes.is_empty() {
            let rollback_results = rollback_batch(
                &succeeded_nodes,
                node_client,
                input.execution_id,
                input.module_name,
            )
            .await;
            final_results.extend(rollback_results);
        }

        Ok(StrategyOutcome {
            succeeded: false,
            node_results: final_results,
            failure_reason: Some(failure_reason),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{nodes, version, NoopControl};
    use rollout_core::id::ResourceId;
    use rollout_node::mock::{MockNodeClient, Scripted};

    fn input<'a>(nodes: Vec<rollout_core::node::Node>, target: &'a rollout_core::module::Version) -> StrategyInput<'a> {
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
    async fn all_nodes_succeed() {
        let strategy = DirectStrategy::new(DirectParams { concurrency: 4 });
        let client = MockNodeClient::new();
        let control = NoopControl::default();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(nodes(6, "1.0.0"), &target), &client, &control)
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.node_results.len(), 6);
        assert!(outcome
            .node_results
            .iter()
            .all(|r| r.status == NodeResultStatus::Success));
    }

    #[tokio::test]
    async fn one_failure_rolls_back_the_rest() {
        let strategy = DirectStrategy::new(DirectParams { concurrency: 4 });
        let client = MockNodeClient::new();
        let bad_node_set = nodes(4, "1.0.0");
        client.script(bad_node_set[0].id, Scripted::FailPermanent);
        let control = NoopControl::default();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(bad_node_set, &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        let rolled_back = outcome
            .node_results
            .iter()
            .filter(|r| r.status == NodeResultStatus::RolledBack)
            .count();
        assert_eq!(rolled_back, 3);
    }

    #[tokio::test]
    async fn cancellation_rolls_back_successful_nodes() {
        let strategy = DirectStrategy::new(DirectParams { concurrency: 4 });
        let client = MockNodeClient::new();
        let control = NoopControl::cancelled();
        let target = version("2.0.0");
        let outcome = strategy
            .execute(input(nodes(3, "1.0.0"), &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_reason.as_deref(), Some("cancelled"));
    }
}
