//! Per-strategy tunables, all defaulted per the configuration table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollingParams {
    /// `None` means `ceil(n / 5)`, minimum 1.
    pub batch_size: Option<usize>,
    pub stabilization_seconds: u64,
    pub health_samples: u32,
    pub sample_interval_seconds: u64,
    pub healthy_threshold: f64,
}

impl Default for RollingParams {
    fn default() -> Self {
        Self {
            batch_size: None,
            stabilization_seconds: 30,
            health_samples: 3,
            sample_interval_seconds: 10,
            healthy_threshold: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueGreenParams {
    pub smoke_window_seconds: u64,
    pub smoke_samples: u32,
    pub hold_seconds: u64,
    pub requires_approval: bool,
}

impl Default for BlueGreenParams {
    fn default() -> Self {
        Self {
            smoke_window_seconds: 30,
            smoke_samples: 3,
            hold_seconds: 600,
            requires_approval: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanaryParams {
    pub steps: Vec<u8>,
    pub step_observation_seconds: u64,
    pub sample_interval_seconds: u64,
    pub error_rate_budget_pct: f64,
    pub latency_budget_ms: u32,
    pub requires_approval_before_full: bool,
}

impl Default for CanaryParams {
    fn default() -> Self {
        Self {
            steps: vec![10, 30, 50, 100],
            step_observation_seconds: 120,
            sample_interval_seconds: 10,
            error_rate_budget_pct: 1.0,
            latency_budget_ms: 500,
            requires_approval_before_full: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectParams {
    pub concurrency: usize,
}

impl Default for DirectParams {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

/// The full per-execution strategy configuration, keyed by which strategy
/// is in play. Stored in `DeploymentExecution::metadata["strategy_params"]`
/// so it travels with the execution across worker restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyParams {
    #[serde(default)]
    pub direct: DirectParams,
    #[serde(default)]
    pub rolling: RollingParams,
    #[serde(default)]
    pub blue_green: BlueGreenParams,
    #[serde(default)]
    pub canary: CanaryParams,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            direct: DirectParams::default(),
            rolling: RollingParams::default(),
            blue_green: BlueGreenParams::default(),
            canary: CanaryParams::default(),
        }
    }
}
