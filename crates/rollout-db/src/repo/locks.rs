//! Distributed lock repository (C3): raw table access backing
//! `rollout_core::lock::DistributedLock`, implemented in `rollout-coordination`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbResult;

#[derive(Debug, sqlx::FromRow)]
pub struct LockRow {
    pub name: String,
    pub owner_id: String,
    pub fencing_token: i64,
    pub expires_at: DateTime<Utc>,
}

pub struct PgLockRepo {
    pool: PgPool,
}

impl PgLockRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claims `name` for `owner_id` if unheld or expired, minting a fresh
    /// fencing token from the shared sequence. Returns `None` if the lock is
    /// currently held by someone else and unexpired.
    pub async fn try_acquire(
        &self,
        name: &str,
        owner_id: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<Option<LockRow>> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            INSERT INTO distributed_locks (name, owner_id, fencing_token, expires_at)
            VALUES ($1, $2, nextval('distributed_lock_fencing_seq'), $3)
            ON CONFLICT (name) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                fencing_token = nextval('distributed_lock_fencing_seq'),
                expires_at = EXCLUDED.expires_at
            WHERE distributed_locks.expires_at < NOW()
            RETURNING name, owner_id, fencing_token, expires_at
            "#,
        )
        .bind(name)
        .bind(owner_id)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn release(&self, name: &str, owner_id: &str, fencing_token: i64) -> DbResult<()> {
        sqlx::query(
            "DELETE FROM distributed_locks WHERE name = $1 AND owner_id = $2 AND fencing_token = $3",
        )
        .bind(name)
        .bind(owner_id)
        .bind(fencing_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn renew(
        &self,
        name: &str,
        owner_id: &str,
        fencing_token: i64,
        expires_at: DateTime<Utc>,
    ) -> DbResult<Option<LockRow>> {
        let row = sqlx::query_as::<_, LockRow>(
            r#"
            UPDATE distributed_locks
            SET expires_at = $4
            WHERE name = $1 AND owner_id = $2 AND fencing_token = $3
            RETURNING name, owner_id, fencing_token, expires_at
            "#,
        )
        .bind(name)
        .bind(owner_id)
        .bind(fencing_token)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
