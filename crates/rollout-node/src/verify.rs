//! Artifact verifier (feeds the pipeline's Verify stage): an HMAC-SHA256
//! signature over the artifact digest, the same scheme a GitHub webhook uses
//! for `X-Hub-Signature-256`.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rollout_core::module::Artifact;
use rollout_core::verify::Verifier;
use rollout_core::{Error, Result};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub struct HmacVerifier {
    signing_key: Vec<u8>,
}

impl HmacVerifier {
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
        }
    }
}

#[async_trait]
impl Verifier for HmacVerifier {
    async fn verify(&self, artifact: &Artifact) -> Result<()> {
        if artifact.digest.is_empty() {
            return Err(Error::Verification(format!(
                "artifact {} has an empty digest",
                artifact.reference
            )));
        }
        let sig_hex = artifact
            .signature
            .strip_prefix("sha256=")
            .unwrap_or(&artifact.signature);
        let sig_bytes = hex::decode(sig_hex)
            .map_err(|_| Error::Verification(format!("artifact {}: signature is not valid hex", artifact.reference)))?;

        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| Error::Verification(format!("invalid signing key: {e}")))?;
        mac.update(artifact.digest.as_bytes());
        mac.verify_slice(&sig_bytes).map_err(|_| {
            Error::Verification(format!(
                "signature mismatch for artifact {}",
                artifact.reference
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(key: &[u8], digest: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(digest.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn accepts_a_correctly_signed_artifact() {
        let key = b"test-signing-key";
        let digest = "sha256:abcd1234";
        let signature = format!("sha256={}", sign(key, digest));
        let artifact = Artifact {
            reference: "payments:1.2.3".to_string(),
            digest: digest.to_string(),
            signature,
        };
        let verifier = HmacVerifier::new(key.to_vec());
        assert!(verifier.verify(&artifact).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_a_tampered_digest() {
        let key = b"test-signing-key";
        let signature = format!("sha256={}", sign(key, "sha256:original"));
        let artifact = Artifact {
            reference: "payments:1.2.3".to_string(),
            digest: "sha256:tampered".to_string(),
            signature,
        };
        let verifier = HmacVerifier::new(key.to_vec());
        assert!(verifier.verify(&artifact).await.is_err());
    }

    #[tokio::test]
    async fn rejects_an_empty_digest() {
        let artifact = Artifact {
            reference: "payments:1.2.3".to_string(),
            digest: String::new(),
            signature: "sha256=00".to_string(),
        };
        let verifier = HmacVerifier::new(b"k".to_vec());
        assert!(verifier.verify(&artifact).await.is_err());
    }
}
