//! The sealed set of rollout strategies. Execution logic lives in the
//! `rollout-strategies` crate; this type is the shared tag used by policy,
//! persistence, and the pipeline state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Direct,
    Rolling,
    BlueGreen,
    Canary,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyKind::Direct => "direct",
            StrategyKind::Rolling => "rolling",
            StrategyKind::BlueGreen => "blue_green",
            StrategyKind::Canary => "canary",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StrategyKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(StrategyKind::Direct),
            "rolling" => Ok(StrategyKind::Rolling),
            "blue_green" | "bluegreen" | "blue-green" => Ok(StrategyKind::BlueGreen),
            "canary" => Ok(StrategyKind::Canary),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown strategy: {other}"
            ))),
        }
    }
}
