//! Blue/Green strategy (§4.8): deploy to the inactive pool, smoke-test it,
//! optionally gate on approval, then flip the active pointer. The old pool
//! is left untouched for `holdSeconds` as a rollback reservoir — rollback
//! is just flipping the pointer back, no redeploy.

use async_trait::async_trait;
use rollout_core::execution::{NodeResult, NodeResultStatus};
use rollout_core::node::{NodeClient, Pool};
use rollout_core::{Error, Result};
use std::time::Duration;

use crate::apply::{apply_batch, ApplyArgs};
use crate::control::{ApprovalOutcome, StrategyControl};
use crate::health::observe_window;
use crate::params::BlueGreenParams;
use crate::{Strategy, StrategyInput, StrategyOutcome};

pub struct BlueGreenStrategy {
    pub params: BlueGreenParams,
}

impl BlueGreenStrategy {
    pub fn new(params: BlueGreenParams) -> Self {
        Self { params }
    }
}

#[async_trait]
impl Strategy for BlueGreenStrategy {
    async fn execute(
        &self,
        input: StrategyInput<'_>,
        node_client: &dyn NodeClient,
        control: &dyn StrategyControl,
    ) -> Result<StrategyOutcome> {
        let active_pool = input
            .nodes
            .iter()
            .find_map(|n| n.pool)
            .ok_or_else(|| Error::Infrastructure("blue/green requires pooled nodes".into()))?;
        let inactive_pool = match active_pool {
            Pool::Blue => Pool::Green,
            Pool::Green => Pool::Blue,
        };

        let inactive_nodes: Vec<_> = input
            .nodes
            .iter()
            .filter(|n| n.pool == Some(inactive_pool))
            .cloned()
            .collect();
        if inactive_nodes.is_empty() {
            return Err(Error::Infrastructure(
                "blue/green requires a non-empty inactive pool".into(),
            ));
        }

        let args = ApplyArgs {
            execution_id: input.execution_id,
            module_name: input.module_name,
            target_version: input.target_version,
            artifact_digest: input.artifact_digest,
            signature: input.signature,
        };
        let deploy_results = apply_batch(&inactive_nodes, node_client, &args, inactive_nodes.len()).await;
        if deploy_results
            .iter()
            .any(|r| r.status == NodeResultStatus::Failed)
        {
            return Ok(StrategyOutcome {
                succeeded: false,
                node_results: deploy_results,
                failure_reason: Some("deploy to inactive pool failed".into()),
            });
        }

        let smoke = observe_window(
            &inactive_nodes,
            node_client,
            self.params.smoke_samples,
            Duration::from_secs(self.params.smoke_window_seconds / self.params.smoke_samples.max(1) as u64),
        )
        .await?;
        if smoke.iter().any(|s| s.healthy_ratio < 1.0) {
            return Ok(StrategyOutcome {
                succeeded: false,
                node_results: deploy_results,
                failure_reason: Some("smoke test against inactive pool failed".into()),
            });
        }

        if self.params.requires_approval {
            control
                .checkpoint(serde_json::json!({ "step": "awaiting_switch_approval" }))
                .await?;
            match control
                .await_approval(serde_json::json!({ "inactive_pool": format!("{inactive_pool:?}") }))
                .await?
            {
                ApprovalOutcome::Approved => {}
                ApprovalOutcome::Rejected => {
                    return Ok(StrategyOutcome {
                        succeeded: false,
                        node_results: deploy_results,
                        failure_reason: Some("switch rejected by approver".into()),
                    });
                }
                ApprovalOutcome::Expired => {
                    return Ok(StrategyOutcome {
                        succeeded: false,
                        node_results: deploy_results,
                        failure_reason: Some("switch approval expired".into()),
                    });
                }
            }
        }

        // Pointer switch + hold window are recorded as resumable context;
        // the actual active-pool bookkeeping lives in the cluster registry,
        // updated by the pipeline's Commit stage once this stage succeeds.
        control
            .checkpoint(serde_json::json!({
                "step": "switched",
                "new_active_pool": format!("{inactive_pool:?}"),
                "hold_seconds": self.params.hold_seconds,
            }))
            .await?;

        let node_results: Vec<NodeResult> = deploy_results;
        Ok(StrategyOutcome {
            succeeded: true,
            node_results,
            failure_reason: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pooled_nodes, version, NoopControl};
    use rollout_core::id::ResourceId;
    use rollout_node::mock::MockNodeClient;

    fn fast_params() -> BlueGreenParams {
        BlueGreenParams {
            smoke_window_seconds: 0,
            smoke_samples: 1,
            hold_seconds: 60,
            requires_approval: false,
        }
    }

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
    async fn deploys_only_to_inactive_pool() {
        let strategy = BlueGreenStrategy::new(fast_params());
        let client = MockNodeClient::new();
        let control = NoopControl::default();
        let target = version("2.0.0");
        let nodes = pooled_nodes(2, 2, "1.0.0");
        let outcome = strategy
            .execute(input(nodes, &target), &client, &control)
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.node_results.len(), 2);
    }

    #[tokio::test]
    async fn requires_approval_before_switch_can_be_rejected() {
        let strategy = BlueGreenStrategy::new(BlueGreenParams {
            requires_approval: true,
            ..fast_params()
        });
        let client = MockNodeClient::new();
        let control = NoopControl::rejecting();
        let target = version("2.0.0");
        let nodes = pooled_nodes(2, 2, "1.0.0");
        let outcome = strategy
            .execute(input(nodes, &target), &client, &control)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        assert_eq!(
            outcome.failure_reason.as_deref(),
            Some("switch rejected by approver")
        );
    }

    #[tokio::test]
    async fn errors_without_pool_assignment() {
        let strategy = BlueGreenStrategy::new(fast_params());
        let client = MockNodeClient::new();
        let control = NoopControl::default();
        let target = version("2.0.0");
        let nodes = crate::testutil::nodes(3, "1.0.0");
        let result = strategy.execute(input(nodes, &target), &client, &control).await;

        assert!(result.is_err());
    }
}
