//! Durable job queue data model (C5).

use serde::{Deserialize, Serialize};

use crate::id::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// A durable, at-least-once pipeline execution job. Claimed by workers using
/// a `SELECT ... FOR UPDATE SKIP LOCKED` pattern (see `rollout-scheduler`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: ResourceId,
    pub deployment_execution_id: ResourceId,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub locked_until: Option<chrono::DateTime<chrono::Utc>>,
    pub processing_instance: Option<String>,
    pub priority: i32,
}

/// Exponential backoff: 5s * 2^n, capped at 5 minutes.
pub fn retry_backoff(retry_count: u32) -> chrono::Duration {
    retry_backoff_from(retry_count, std::time::Duration::from_secs(5))
}

/// Exponential backoff with a configurable base, still capped at 5 minutes.
pub fn retry_backoff_from(retry_count: u32, base: std::time::Duration) -> chrono::Duration {
    let seconds = (base.as_secs() as i64).saturating_mul(1i64 << retry_count.min(10));
    chrono::Duration::seconds(seconds.min(300))
}

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_LEASE: std::time::Duration = std::time::Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(0), chrono::Duration::seconds(5));
        assert_eq!(retry_backoff(1), chrono::Duration::seconds(10));
        assert_eq!(retry_backoff(2), chrono::Duration::seconds(20));
        assert_eq!(retry_backoff(10), chrono::Duration::seconds(300));
    }
}
