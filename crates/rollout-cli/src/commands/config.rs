//! Local validation of the declarative KDL configuration documents, without
//! touching the orchestrator API.

use anyhow::{Context, Result};
use rollout_config::{parse_cluster_topology, parse_runtime_config};

pub fn validate_cluster(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    match parse_cluster_topology(&content) {
        Ok(nodes) => {
            println!("cluster topology is valid: {} node(s)", nodes.len());
            let mut by_env: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
            for node in &nodes {
                *by_env.entry(node.environment.to_string()).or_default() += 1;
            }
            for (environment, count) in by_env {
                println!("  {environment}: {count}");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("cluster topology error: {e}");
            std::process::exit(1);
        }
    }
}

pub fn validate_policy(path: &str) -> Result<()> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    match parse_runtime_config(&content) {
        Ok(config) => {
            println!("runtime policy is valid");
            if let Some(strategy) = config.default_strategy {
                println!("  default strategy: {strategy}");
            }
            println!("  environment overrides: {}", config.environments.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("runtime policy error: {e}");
            std::process::exit(1);
        }
    }
}
