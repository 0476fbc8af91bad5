//! Idempotency store contract (C4).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub enum IdempotencyOutcome {
    Fresh,
    Duplicate(serde_json::Value),
}

/// `check_or_insert` must be atomic: under concurrent callers with the same
/// key, exactly one observes `Fresh`.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn check_or_insert(
        &self,
        key: &str,
        new_value: serde_json::Value,
        ttl: chrono::Duration,
    ) -> Result<IdempotencyOutcome>;
}
