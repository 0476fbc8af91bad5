//! Idempotency store repository (C4): raw table access. The
//! `rollout_core::idempotency::IdempotencyStore` trait is implemented on top
//! of this in `rollout-coordination`, which also owns TTL policy.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbResult;

#[derive(Debug, sqlx::FromRow)]
pub struct IdempotencyRow {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct PgIdempotencyRepo {
    pool: PgPool,
}

impl PgIdempotencyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically inserts `(key, value)` if no unexpired row exists for
    /// `key`. Returns `None` when the insert won (fresh), or the existing
    /// row when a concurrent or prior caller already claimed it
    /// (duplicate). Relies on `sweep_expired` running periodically so an
    /// expired row is gone, not merely stale, by the time this races it.
    pub async fn check_or_insert(
        &self,
        key: &str,
        value: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> DbResult<Option<IdempotencyRow>> {
        let inserted = sqlx::query_as::<_, IdempotencyRow>(
            r#"
            INSERT INTO idempotency_records (key, value, created_at, expires_at)
            VALUES ($1, $2, NOW(), $3)
            ON CONFLICT (key) DO NOTHING
            RETURNING key, value, created_at, expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        if inserted.is_some() {
            return Ok(None);
        }
        let existing = sqlx::query_as::<_, IdempotencyRow>(
            "SELECT key, value, created_at, expires_at FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(existing))
    }

    pub async fn sweep_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
