//! Cluster topology parsing (C2): the declarative environment -> node-list
//! config the registry is seeded from at startup.
//!
//! ```kdl
//! environment "production" {
//!     node "web-1" hostname="web-1.prod.internal" pool="blue"
//!     node "web-2" hostname="web-2.prod.internal" pool="green"
//! }
//! ```

use kdl::KdlDocument;
use rollout_core::environment::Environment;
use rollout_core::id::ResourceId;
use rollout_core::node::{HealthStatus, Node, NodeId, Pool};

use crate::{ConfigError, ConfigResult};

/// Fixed namespace so a node's id is stable across restarts as long as its
/// (environment, name) pair doesn't change.
const NODE_ID_NAMESPACE: uuid::Uuid = uuid::uuid!("8f14e3f1-b371-4f93-9f4a-6c2f6c9d9a31");

fn node_id(environment: Environment, name: &str) -> NodeId {
    let seed = format!("{environment}:{name}");
    NodeId(ResourceId::from_uuid(uuid::Uuid::new_v5(
        &NODE_ID_NAMESPACE,
        seed.as_bytes(),
    )))
}

/// Parses the full cluster topology document into a flat node list, ready
/// for `ClusterRegistry::from_nodes`.
pub fn parse_cluster_topology(kdl_text: &str) -> ConfigResult<Vec<Node>> {
    let doc: KdlDocument = kdl_text.parse()?;
    let mut nodes = Vec::new();

    for env_node in doc.nodes() {
        if env_node.name().value() != "environment" {
            continue;
        }
        let env_name = first_string_arg(env_node)
            .ok_or_else(|| ConfigError::MissingField("environment name".to_string()))?;
        let environment: Environment = env_name
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "environment".to_string(),
                message: format!("unknown environment {env_name:?}"),
            })?;

        let children = env_node
            .children()
            .ok_or_else(|| ConfigError::MissingField(format!("nodes for environment {env_name}")))?;

        for node_decl in children.nodes() {
            if node_decl.name().value() != "node" {
                continue;
            }
            let name = first_string_arg(node_decl)
                .ok_or_else(|| ConfigError::MissingField("node name".to_string()))?;
            let hostname = string_prop(node_decl, "hostname")
                .ok_or_else(|| ConfigError::MissingField(format!("node {name}: hostname")))?
                .to_string();
            let pool = match string_prop(node_decl, "pool") {
                Some("blue") => Some(Pool::Blue),
                Some("green") => Some(Pool::Green),
                Some(other) => {
                    return Err(ConfigError::InvalidValue {
                        field: "pool".to_string(),
                        message: format!("node {name}: unknown pool {other:?}"),
                    });
                }
                None => None,
            };

            nodes.push(Node {
                id: node_id(environment, name),
                hostname,
                environment,
                current_versions: Default::default(),
                last_heartbeat: None,
                health: HealthStatus::Unknown,
                pool,
            });
        }
    }

    Ok(nodes)
}

fn first_string_arg<'a>(node: &'a kdl::KdlNode) -> Option<&'a str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

fn string_prop<'a>(node: &'a kdl::KdlNode, key: &str) -> Option<&'a str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .and_then(|e| e.value().as_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environments_and_nodes() {
        let kdl = r#"
            environment "production" {
                node "web-1" hostname="web-1.prod.internal" pool="blue"
                node "web-2" hostname="web-2.prod.internal" pool="green"
            }
            environment "staging" {
                node "web-1" hostname="web-1.staging.internal"
            }
        "#;
        let nodes = parse_cluster_topology(kdl).unwrap();
        assert_eq!(nodes.len(), 3);
        let prod: Vec<_> = nodes
            .iter()
            .filter(|n| n.environment == Environment::Production)
            .collect();
        assert_eq!(prod.len(), 2);
        assert!(prod.iter().any(|n| n.hostname == "web-1.prod.internal"));
    }

    #[test]
    fn node_ids_are_stable_across_parses() {
        let kdl = r#"environment "qa" { node "a" hostname="a.qa.internal" }"#;
        let first = parse_cluster_topology(kdl).unwrap();
        let second = parse_cluster_topology(kdl).unwrap();
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn rejects_unknown_environment() {
        let kdl = r#"environment "moon-base" { node "a" hostname="a" }"#;
        assert!(parse_cluster_topology(kdl).is_err());
    }
}
