//! Environments and the rollout policy attached to each.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::strategy::StrategyKind;

/// One of the fixed, ordered set of deployment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Qa,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Qa,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Qa => "qa",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "qa" => Ok(Environment::Qa),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown environment: {other}"
            ))),
        }
    }
}

/// Policy attached to an environment: approval gating, allowed strategies,
/// and concurrency ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentPolicy {
    pub environment: Environment,
    pub requires_approval: bool,
    pub default_strategy: StrategyKind,
    pub allowed_strategies: Vec<StrategyKind>,
    pub max_concurrent_deployments: u32,
    pub approval_ttl: chrono::Duration,
    pub min_healthy_ratio: f64,
}

impl EnvironmentPolicy {
    /// Default policy ladder: approval and TTL get stricter as environments
    /// get closer to production; every environment otherwise allows all
    /// four strategies.
    pub fn default_for(environment: Environment) -> Self {
        let (requires_approval, approval_ttl) = match environment {
            Environment::Development | Environment::Qa => (false, chrono::Duration::hours(4)),
            Environment::Staging => (true, chrono::Duration::hours(24)),
            Environment::Production => (true, chrono::Duration::hours(48)),
        };
        let default_strategy = match environment {
            Environment::Development => StrategyKind::Direct,
            Environment::Qa => StrategyKind::Rolling,
            Environment::Staging => StrategyKind::BlueGreen,
            Environment::Production => StrategyKind::Canary,
        };
        Self {
            environment,
            requires_approval,
            default_strategy,
            allowed_strategies: vec![
                StrategyKind::Direct,
                StrategyKind::Rolling,
                StrategyKind::BlueGreen,
                StrategyKind::Canary,
            ],
            max_concurrent_deployments: 1,
            approval_ttl,
            min_healthy_ratio: 0.80,
        }
    }

    pub fn allows(&self, strategy: StrategyKind) -> bool {
        self.allowed_strategies.contains(&strategy)
    }
}
