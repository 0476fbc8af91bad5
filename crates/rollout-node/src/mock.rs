//! An in-memory `NodeClient` for tests: configurable per-node failure
//! injection, idempotent by (execution id, node id) like the real protocol
//! requires.

use async_trait::async_trait;
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use rollout_core::node::{HealthSample, HealthStatus, Node, NodeApplyResult, NodeClient, NodeId};
use rollout_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Scripted {
    Succeed,
    FailTransient(u32),
    FailPermanent,
}

#[derive(Default)]
pub struct MockNodeClient {
    scripts: Mutex<HashMap<NodeId, Scripted>>,
    applied: Mutex<HashMap<(ResourceId, NodeId), Version>>,
    attempts: Mutex<HashMap<(ResourceId, NodeId), u32>>,
    health: Mutex<HashMap<NodeId, HealthStatus>>,
}

impl MockNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, node: NodeId, behavior: Scripted) {
        self.scripts.lock().unwrap().insert(node, behavior);
    }

    pub fn set_health(&self, node: NodeId, status: HealthStatus) {
        self.health.lock().unwrap().insert(node, status);
    }

    pub fn attempts_for(&self, execution_id: ResourceId, node: NodeId) -> u32 {
        *self
            .attempts
            .lock()
            .unwrap()
            .get(&(execution_id, node))
            .unwrap_or(&0)
    }
}

#[async_trait]
impl NodeClient for MockNodeClient {
    async fn deploy(
        &self,
        execution_id: ResourceId,
        node: &Node,
        _module: &str,
        version: &Version,
        _artifact_digest: &str,
        _signature: &str,
    ) -> Result<NodeApplyResult> {
        let key = (execution_id, node.id);
        if let Some(applied) = self.applied.lock().unwrap().get(&key) {
            // Idempotent replay: already applied, don't double-apply.
            return Ok(NodeApplyResult {
                duration_ms: 0,
                applied_version: applied.clone(),
            });
        }

        let mut attempts = self.attempts.lock().unwrap();
        let count = attempts.entry(key).or_insert(0);
        *count += 1;
        let attempt = *count;
        drop(attempts);

        let behavior = self
            .scripts
            .lock()
            .unwrap()
            .get(&node.id)
            .cloned()
            .unwrap_or(Scripted::Succeed);

        match behavior {
            Scripted::Succeed => {
                self.applied.lock().unwrap().insert(key, version.clone());
                Ok(NodeApplyResult {
                    duration_ms: 10,
                    applied_version: version.clone(),
                })
            }
            Scripted::FailTransient(until_attempt) => {
                if attempt > until_attempt {
                    self.applied.lock().unwrap().insert(key, version.clone());
                    Ok(NodeApplyResult {
                        duration_ms: 10,
                        applied_version: version.clone(),
                    })
                } else {
                    Err(Error::NodeTransient(format!(
                        "scripted transient failure (attempt {attempt})"
                    )))
                }
            }
            Scripted::FailPermanent => Err(Error::NodePermanent("scripted permanent failure".into())),
        }
    }

    async fn rollback(
        &self,
        execution_id: ResourceId,
        node: &Node,
        _module: &str,
        to_version: &Version,
    ) -> Result<NodeApplyResult> {
        self.applied
            .lock()
            .unwrap()
            .insert((execution_id, node.id), to_version.clone());
        Ok(NodeApplyResult {
            duration_ms: 5,
            applied_version: to_version.clone(),
        })
    }

    async fn health_check(&self, node: &Node, _timeout: Duration) -> Result<HealthSample> {
        let status = self
            .health
            .lock()
            .unwrap()
            .get(&node.id)
            .copied()
            .unwrap_or(HealthStatus::Healthy);
        Ok(HealthSample {
            status,
            latency_ms: 5,
            error_rate_pct: 0.0,
            cpu_pct: 10.0,
            mem_pct: 20.0,
        })
    }
}
