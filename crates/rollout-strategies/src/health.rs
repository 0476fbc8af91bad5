//! Health sampling shared by the rolling stabilization window, the
//! blue/green smoke stage, and canary step observation. Each strategy picks
//! its own pass/fail thresholds; this module only aggregates raw samples.

use rollout_core::node::{HealthStatus, Node, NodeClient};
use rollout_core::Result;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    pub healthy_ratio: f64,
    pub error_rate_pct: f64,
    pub p95_latency_ms: u32,
}

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Samples every node once and aggregates: error rate is the mean across
/// nodes, p95 latency is computed across the per-node samples taken in
/// this one pass. Cluster-wide rather than per-node keeps the canary,
/// rolling, and blue/green code paths uniform.
pub async fn sample_once(nodes: &[Node], node_client: &dyn NodeClient) -> Result<HealthSnapshot> {
    let mut statuses = Vec::with_capacity(nodes.len());
    let mut latencies = Vec::with_capacity(nodes.len());
    let mut error_rates = Vec::with_capacity(nodes.len());

    for node in nodes {
        match node_client.health_check(node, HEALTH_CHECK_TIMEOUT).await {
            Ok(sample) => {
                statuses.push(sample.status);
                latencies.push(sample.latency_ms);
                error_rates.push(sample.error_rate_pct);
            }
            Err(_) => {
                statuses.push(HealthStatus::Unhealthy);
                latencies.push(u32::MAX);
                error_rates.push(100.0);
            }
        }
    }

    let healthy = statuses
        .iter()
        .filter(|s| **s == HealthStatus::Healthy)
        .count();
    let healthy_ratio = if nodes.is_empty() {
        1.0
    } else {
        healthy as f64 / nodes.len() as f64
    };
    let error_rate_pct = if error_rates.is_empty() {
        0.0
    } else {
        error_rates.iter().sum::<f64>() / error_rates.len() as f64
    };
    latencies.sort_unstable();
    let p95_latency_ms = percentile(&latencies, 0.95);

    Ok(HealthSnapshot {
        healthy_ratio,
        error_rate_pct,
        p95_latency_ms,
    })
}

fn percentile(sorted: &[u32], p: f64) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((sorted.len() as f64 - 1.0) * p).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Observe `samples` times, `interval` apart, returning every snapshot
/// taken. Callers decide pass/fail per their own budget.
pub async fn observe_window(
    nodes: &[Node],
    node_client: &dyn NodeClient,
    samples: u32,
    interval: Duration,
) -> Result<Vec<HealthSnapshot>> {
    let mut out = Vec::with_capacity(samples as usize);
    for i in 0..samples {
        if i > 0 {
            tokio::time::sleep(interval).await;
        }
        out.push(sample_once(nodes, node_client).await?);
    }
    Ok(out)
}
