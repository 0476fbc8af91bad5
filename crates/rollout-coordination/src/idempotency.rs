//! PostgreSQL-backed `IdempotencyStore` (C4): a single `INSERT ... ON
//! CONFLICT DO NOTHING` decides the race; the loser reads back whatever the
//! winner stored.

use async_trait::async_trait;
use rollout_core::idempotency::{IdempotencyOutcome, IdempotencyStore};
use rollout_core::{Error, Result};
use rollout_db::repo::PgIdempotencyRepo;
use sqlx::PgPool;

pub struct PgIdempotencyStore {
    repo: PgIdempotencyRepo,
}

impl PgIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: PgIdempotencyRepo::new(pool),
        }
    }
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn check_or_insert(
        &self,
        key: &str,
        new_value: serde_json::Value,
        ttl: chrono::Duration,
    ) -> Result<IdempotencyOutcome> {
        let expires_at = chrono::Utc::now() + ttl;
        let existing = self
            .repo
            .check_or_insert(key, &new_value, expires_at)
            .await
            .map_err(|e| Error::Infrastructure(e.to_string()))?;
        match existing {
            None => Ok(IdempotencyOutcome::Fresh),
            Some(row) => Ok(IdempotencyOutcome::Duplicate(row.value)),
        }
    }
}
