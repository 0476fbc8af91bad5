//! Distributed lock contract (C3).

use async_trait::async_trait;
use std::time::Duration;

use crate::Result;

/// A held lock. Carries a fencing token so a holder whose lock has been
/// revoked by TTL expiry can never act as if it still held it.
#[derive(Debug, Clone)]
pub struct LockHandle {
    pub name: String,
    pub owner_id: String,
    pub fencing_token: i64,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    TimedOut,
}

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Blocks up to `wait_timeout` trying to acquire `name` for `ttl`.
    async fn acquire(
        &self,
        name: &str,
        ttl: Duration,
        wait_timeout: Duration,
    ) -> Result<Option<LockHandle>>;

    /// Releases the lock; a no-op if the handle's fencing token no longer
    /// matches the current holder (i.e. the lock already expired and was
    /// re-acquired by someone else).
    async fn release(&self, handle: &LockHandle) -> Result<()>;

    /// Extends the TTL; fails if the caller no longer holds the lock.
    async fn renew(&self, handle: &LockHandle, ttl: Duration) -> Result<LockHandle>;
}

/// Deterministic lock scope for a deployment pipeline: at most one
/// non-terminal execution per (environment, module) at a time.
pub fn deploy_lock_name(environment: &str, module_name: &str) -> String {
    format!("deploy:{environment}:{module_name}")
}
