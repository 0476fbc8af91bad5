//! Cluster registry (C2): the environment -> node-set mapping, loaded from a
//! declarative config at startup, with health and current-version tracked
//! in memory as the source of live state for strategies to read.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::environment::Environment;
use crate::module::Version;
use crate::node::{HealthStatus, Node, NodeId};
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<NodeId, Node>,
}

/// In-memory cluster registry. Node current-version is updated only by the
/// pipeline's post-deploy Commit stage; health is updated by whoever polls
/// `NodeClient::health_check` (typically the preflight/stabilization loops).
#[derive(Clone)]
pub struct ClusterRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Build a registry from a static environment -> nodes declaration.
    pub fn from_nodes(nodes: Vec<Node>) -> Self {
        let registry = Self::new();
        {
            let mut inner = registry.inner.try_write().expect("fresh registry");
            for node in nodes {
                inner.nodes.insert(node.id, node);
            }
        }
        registry
    }

    pub async fn list_nodes(&self, environment: Environment) -> Vec<Node> {
        let inner = self.inner.read().await;
        inner
            .nodes
            .values()
            .filter(|n| n.environment == environment)
            .cloned()
            .collect()
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Node> {
        let inner = self.inner.read().await;
        inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("node {id}")))
    }

    pub async fn update_health(&self, id: NodeId, status: HealthStatus, at: chrono::DateTime<chrono::Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(node) = inner.nodes.get_mut(&id) {
            node.health = status;
            node.last_heartbeat = Some(at);
        }
    }

    /// Commit a newly-applied version for a node; called only from the
    /// pipeline's Commit stage, never mid-rollout.
    pub async fn commit_version(&self, id: NodeId, module: &str, version: Version) -> Result<()> {
        let mut inner = self.inner.write().await;
        let node = inner
            .nodes
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("node {id}")))?;
        node.current_versions.insert(module.to_string(), version);
        Ok(())
    }

    pub async fn healthy_ratio(&self, environment: Environment) -> f64 {
        let nodes = self.list_nodes(environment).await;
        if nodes.is_empty() {
            return 0.0;
        }
        let healthy = nodes
            .iter()
            .filter(|n| n.health == HealthStatus::Healthy)
            .count();
        healthy as f64 / nodes.len() as f64
    }
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
