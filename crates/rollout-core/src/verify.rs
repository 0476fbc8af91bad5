//! Artifact verification contract. Binary verification cryptography itself
//! is explicitly out of scope for the core (delegated to a verifier); the
//! pipeline's Verify stage only consumes this interface.

use async_trait::async_trait;

use crate::module::Artifact;
use crate::Result;

#[async_trait]
pub trait Verifier: Send + Sync {
    /// Checks the artifact's content digest and detached signature.
    /// Returns `Err(Error::Verification(..))` on any mismatch; this is
    /// always fatal, never retried.
    async fn verify(&self, artifact: &Artifact) -> Result<()>;
}
