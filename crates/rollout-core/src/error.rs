//! Error taxonomy for the orchestration core.
//!
//! Variants map onto the surface categories from the error-handling design:
//! validation failures never create state, infrastructure failures are
//! always retryable by the job queue, and node-level failures carry enough
//! shape for a strategy to decide whether to tolerate or roll back.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("node transient error: {0}")]
    NodeTransient(String),

    #[error("node permanent error: {0}")]
    NodePermanent(String),

    #[error("policy violation: {0}")]
    Policy(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// NodeTransient and Infrastructure failures are safe to retry within a
    /// strategy's or the job queue's own budget; every other variant is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::NodeTransient(_) | Error::Infrastructure(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
