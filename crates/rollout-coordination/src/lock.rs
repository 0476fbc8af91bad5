//! PostgreSQL-backed `DistributedLock` (C3): one row per lock name, a
//! monotonic fencing token minted from a shared sequence on every
//! acquisition, short polling while waiting for a held lock to expire.

use async_trait::async_trait;
use rollout_core::lock::{DistributedLock, LockHandle};
use rollout_core::{Error, Result};
use rollout_db::repo::PgLockRepo;
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct PgDistributedLock {
    repo: PgLockRepo,
    owner_id: String,
}

impl PgDistributedLock {
    pub fn new(pool: PgPool, owner_id: impl Into<String>) -> Self {
        Self {
            repo: PgLockRepo::new(pool),
            owner_id: owner_id.into(),
        }
    }
}

#[async_trait]
impl DistributedLock for PgDistributedLock {
    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<Option<LockHandle>> {
        let deadline = chrono::Utc::now() + chrono::Duration::from_std(wait_timeout).unwrap_or_default();
        loop {
            let expires_at = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
            let row = self
                .repo
                .try_acquire(name, &self.owner_id, expires_at)
                .await
                .map_err(|e| Error::Infrastructure(e.to_string()))?;
            if let Some(row) = row {
                return Ok(Some(LockHandle {
                    name: row.name,
                    owner_id: row.owner_id,
                    fencing_token: row.fencing_token,
                    expires_at: row.expires_at,
                }));
            }
            if chrono::Utc::now() >= deadline {
                debug!(lock = name, "timed out waiting for lock");
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<()> {
        self.repo
            .release(&handle.name, &handle.owner_id, handle.fencing_token)
            .await
            .map_err(|e| Error::Infrastructure(e.to_string()))
    }

    async fn renew(&self, handle: &LockHandle, ttl: Duration) -> Result<LockHandle> {
        let expires_at = chrono::Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let row = self
            .repo
            .renew(&handle.name, &handle.owner_id, handle.fencing_token, expires_at)
            .await
            .map_err(|e| Error::Infrastructure(e.to_string()))?
            .ok_or_else(|| Error::Conflict(format!("lock {} no longer held", handle.name)))?;
        Ok(LockHandle {
            name: row.name,
            owner_id: row.owner_id,
            fencing_token: row.fencing_token,
            expires_at: row.expires_at,
        })
    }
}
