//! Policy/tunables parsing: the flat `key = value` configuration surface
//! enumerated in the external-interfaces configuration table (strategy
//! defaults and per-strategy knobs, approval TTLs, preflight/execution
//! limits, job retry policy, lock lifecycle, per-environment overrides).
//!
//! ```kdl
//! strategy default="rolling"
//! strategy.rolling batchSize=5 healthyThreshold=1.0
//! strategy.canary steps="10,30,50,100" observationSeconds=120 errorBudget=1.0
//! strategy.bluegreen holdSeconds=600
//! pipeline.preflight minHealthyRatio=0.8
//! pipeline.execution deadlineSeconds=14400
//! job maxRetries=5 backoffSeconds=5
//! lock ttlSeconds=300 renewIntervalSeconds=60
//!
//! env "production" {
//!     approvalTtlHours 48
//!     requiresApproval true
//!     maxConcurrent 1
//! }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use kdl::{KdlDocument, KdlNode};
use rollout_core::environment::Environment;
use rollout_core::strategy::StrategyKind;

use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone)]
pub struct EnvironmentOverride {
    pub approval_ttl: Option<chrono::Duration>,
    pub requires_approval: Option<bool>,
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub default_strategy: Option<StrategyKind>,
    pub rolling_batch_size: Option<usize>,
    pub rolling_healthy_threshold: Option<f64>,
    pub canary_steps: Option<Vec<u8>>,
    pub canary_observation_seconds: Option<u64>,
    pub canary_error_budget_pct: Option<f64>,
    pub bluegreen_hold_seconds: Option<u64>,
    pub preflight_min_healthy_ratio: Option<f64>,
    pub execution_deadline: Option<Duration>,
    pub job_max_retries: Option<u32>,
    pub job_backoff_base: Option<Duration>,
    pub lock_ttl: Option<Duration>,
    pub lock_renew_interval: Option<Duration>,
    pub environments: HashMap<Environment, EnvironmentOverride>,
}

impl RuntimeConfig {
    /// Merge the declarative overrides onto `EnvironmentPolicy::default_for`:
    /// a global `strategy default=` applies to every environment unless the
    /// environment has no specific override; per-env `env "..."` blocks win
    /// over the ladder defaults field by field.
    pub fn policy_for(
        &self,
        environment: Environment,
    ) -> rollout_core::environment::EnvironmentPolicy {
        let mut policy = rollout_core::environment::EnvironmentPolicy::default_for(environment);
        if let Some(strategy) = self.default_strategy {
            policy.default_strategy = strategy;
        }
        if let Some(over_ride) = self.environments.get(&environment) {
            if let Some(approval_ttl) = over_ride.approval_ttl {
                policy.approval_ttl = approval_ttl;
            }
            if let Some(requires_approval) = over_ride.requires_approval {
                policy.requires_approval = requires_approval;
            }
            if let Some(max_concurrent) = over_ride.max_concurrent {
                policy.max_concurrent_deployments = max_concurrent;
            }
        }
        if let Some(ratio) = self.preflight_min_healthy_ratio {
            policy.min_healthy_ratio = ratio;
        }
        policy
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_strategy: None,
            rolling_batch_size: None,
            rolling_healthy_threshold: None,
            canary_steps: None,
            canary_observation_seconds: None,
            canary_error_budget_pct: None,
            bluegreen_hold_seconds: None,
            preflight_min_healthy_ratio: None,
            execution_deadline: None,
            job_max_retries: None,
            job_backoff_base: None,
            lock_ttl: None,
            lock_renew_interval: None,
            environments: HashMap::new(),
        }
    }
}

pub fn parse_runtime_config(kdl_text: &str) -> ConfigResult<RuntimeConfig> {
    let doc: KdlDocument = kdl_text.parse()?;
    let mut config = RuntimeConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "strategy" => apply_strategy(node, &mut config)?,
            "strategy.rolling" => {
                config.rolling_batch_size = int_prop(node, "batchSize").map(|n| n as usize);
                config.rolling_healthy_threshold = float_prop(node, "healthyThreshold");
            }
            "strategy.canary" => {
                config.canary_steps = string_prop(node, "steps").map(parse_canary_steps);
                config.canary_observation_seconds =
                    int_prop(node, "observationSeconds").map(|s| s as u64);
                config.canary_error_budget_pct = float_prop(node, "errorBudget");
            }
            "strategy.bluegreen" => {
                config.bluegreen_hold_seconds = int_prop(node, "holdSeconds").map(|s| s as u64);
            }
            "pipeline.preflight" => {
                config.preflight_min_healthy_ratio = float_prop(node, "minHealthyRatio");
            }
            "pipeline.execution" => {
                config.execution_deadline =
                    int_prop(node, "deadlineSeconds").map(|s| Duration::from_secs(s as u64));
            }
            "job" => {
                config.job_max_retries = int_prop(node, "maxRetries").map(|n| n as u32);
                config.job_backoff_base =
                    int_prop(node, "backoffSeconds").map(|s| Duration::from_secs(s as u64));
            }
            "lock" => {
                config.lock_ttl =
                    int_prop(node, "ttlSeconds").map(|s| Duration::from_secs(s as u64));
                config.lock_renew_interval =
                    int_prop(node, "renewIntervalSeconds").map(|s| Duration::from_secs(s as u64));
            }
            "env" => apply_env_override(node, &mut config)?,
            _ => {}
        }
    }

    Ok(config)
}

fn apply_strategy(node: &KdlNode, config: &mut RuntimeConfig) -> ConfigResult<()> {
    // Bare `strategy default="..."` node, or a dotted child such as
    // `strategy.rolling`/`strategy.canary`/`strategy.bluegreen`.
    if let Some(default) = string_prop(node, "default") {
        config.default_strategy = Some(parse_strategy_kind(default)?);
    }
    Ok(())
}

fn apply_env_override(node: &KdlNode, config: &mut RuntimeConfig) -> ConfigResult<()> {
    let name = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::MissingField("env name".to_string()))?;
    let environment: Environment = name.parse().map_err(|_| ConfigError::InvalidValue {
        field: "env".to_string(),
        message: format!("unknown environment {name:?}"),
    })?;

    let mut over_ride = EnvironmentOverride {
        approval_ttl: None,
        requires_approval: None,
        max_concurrent: None,
    };
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "approvalTtlHours" => {
                    over_ride.approval_ttl =
                        first_int_arg(child).map(chrono::Duration::hours);
                }
                "requiresApproval" => {
                    over_ride.requires_approval = first_bool_arg(child);
                }
                "maxConcurrent" => {
                    over_ride.max_concurrent = first_int_arg(child).map(|n| n as u32);
                }
                _ => {}
            }
        }
    }
    config.environments.insert(environment, over_ride);
    Ok(())
}

fn parse_canary_steps(raw: &str) -> Vec<u8> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<u8>().ok())
        .collect()
}

fn parse_strategy_kind(raw: &str) -> ConfigResult<StrategyKind> {
    match raw {
        "direct" => Ok(StrategyKind::Direct),
        "rolling" => Ok(StrategyKind::Rolling),
        "bluegreen" | "blue_green" => Ok(StrategyKind::BlueGreen),
        "canary" => Ok(StrategyKind::Canary),
        other => Err(ConfigError::InvalidValue {
            field: "strategy".to_string(),
            message: format!("unknown strategy {other:?}"),
        }),
    }
}

fn string_prop<'a>(node: &'a KdlNode, key: &str) -> Option<&'a str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .and_then(|e| e.value().as_string())
}

fn float_prop(node: &KdlNode, key: &str) -> Option<f64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .and_then(|e| e.value().as_float().or_else(|| e.value().as_integer().map(|i| i as f64)))
}

fn int_prop(node: &KdlNode, key: &str) -> Option<i64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .and_then(|e| e.value().as_integer().map(|i| i as i64))
}

fn first_int_arg(node: &KdlNode) -> Option<i64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer().map(|i| i as i64))
}

fn first_bool_arg(node: &KdlNode) -> Option<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strategy_defaults_and_env_overrides() {
        let kdl = r#"
            strategy default="rolling"
            pipeline.preflight minHealthyRatio=0.8
            job maxRetries=5 backoffSeconds=5
            lock ttlSeconds=300 renewIntervalSeconds=60

            env "production" {
                approvalTtlHours 48
                requiresApproval true
                maxConcurrent 1
            }
        "#;
        let config = parse_runtime_config(kdl).unwrap();
        assert_eq!(config.default_strategy, Some(StrategyKind::Rolling));
        assert_eq!(config.preflight_min_healthy_ratio, Some(0.8));
        assert_eq!(config.job_max_retries, Some(5));
        assert_eq!(config.lock_ttl, Some(Duration::from_secs(300)));

        let prod = config.environments.get(&Environment::Production).unwrap();
        assert_eq!(prod.approval_ttl, Some(chrono::Duration::hours(48)));
        assert_eq!(prod.requires_approval, Some(true));
        assert_eq!(prod.max_concurrent, Some(1));
    }

    #[test]
    fn unrecognized_top_level_nodes_are_ignored() {
        let kdl = r#"future.feature enabled=true"#;
        assert!(parse_runtime_config(kdl).is_ok());
    }

    #[test]
    fn parses_per_strategy_knobs() {
        let kdl = r#"
            strategy.rolling batchSize=5 healthyThreshold=1.0
            strategy.canary steps="10,30,50,100" observationSeconds=120 errorBudget=1.0
            strategy.bluegreen holdSeconds=600
        "#;
        let config = parse_runtime_config(kdl).unwrap();
        assert_eq!(config.rolling_batch_size, Some(5));
        assert_eq!(config.rolling_healthy_threshold, Some(1.0));
        assert_eq!(config.canary_steps, Some(vec![10, 30, 50, 100]));
        assert_eq!(config.canary_observation_seconds, Some(120));
        assert_eq!(config.canary_error_budget_pct, Some(1.0));
        assert_eq!(config.bluegreen_hold_seconds, Some(600));
    }

    #[test]
    fn policy_for_merges_overrides_onto_the_default_ladder() {
        let kdl = r#"
            strategy default="canary"
            pipeline.preflight minHealthyRatio=0.95

            env "qa" {
                requiresApproval true
                approvalTtlHours 2
            }
        "#;
        let config = parse_runtime_config(kdl).unwrap();

        let qa = config.policy_for(Environment::Qa);
        assert_eq!(qa.default_strategy, StrategyKind::Canary);
        assert!(qa.requires_approval);
        assert_eq!(qa.approval_ttl, chrono::Duration::hours(2));
        assert_eq!(qa.min_healthy_ratio, 0.95);

        let dev = config.policy_for(Environment::Development);
        assert_eq!(dev.default_strategy, StrategyKind::Canary);
        assert!(!dev.requires_approval);
    }
}
