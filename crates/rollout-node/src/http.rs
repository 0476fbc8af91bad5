//! HTTP node client: the reference implementation of the node-client
//! protocol (`POST /deploy`, `POST /rollback`, `GET /health`), each call
//! carrying a W3C traceparent header.

use async_trait::async_trait;
use rollout_core::id::ResourceId;
use rollout_core::module::Version;
use rollout_core::node::{HealthSample, HealthStatus, Node, NodeApplyResult, NodeClient};
use rollout_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Base URL builder: given a node's hostname, produce the address its agent
/// listens on. Kept as a trait so callers in tests/docs can stub it out
/// without standing up a real scheme/port convention.
pub trait NodeAddressBook: Send + Sync {
    fn base_url(&self, node: &Node) -> String;
}

/// Default address book: `http://{hostname}:{port}`.
pub struct FixedPortAddressBook {
    pub port: u16,
}

impl NodeAddressBook for FixedPortAddressBook {
    fn base_url(&self, node: &Node) -> String {
        format!("http://{}:{}", node.hostname, self.port)
    }
}

pub struct HttpNodeClient {
    client: reqwest::Client,
    addresses: Box<dyn NodeAddressBook>,
}

impl HttpNodeClient {
    pub fn new(addresses: impl NodeAddressBook + 'static) -> Self {
        Self {
            client: reqwest::Client::new(),
            addresses: Box::new(addresses),
        }
    }

    fn traceparent(&self, execution_id: ResourceId) -> String {
        // 00-{32 hex trace-id}-{16 hex span-id}-01
        format!(
            "00-{:032x}-{:016x}-01",
            execution_id.as_uuid().as_u128(),
            rand_span_id()
        )
    }
}

fn rand_span_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    #[serde(rename = "executionId")]
    execution_id: ResourceId,
    #[serde(rename = "moduleName")]
    module_name: &'a str,
    version: String,
    #[serde(rename = "artifactDigest")]
    artifact_digest: &'a str,
    signature: &'a str,
}

#[derive(Debug, Serialize)]
struct RollbackRequest<'a> {
    #[serde(rename = "executionId")]
    execution_id: ResourceId,
    #[serde(rename = "moduleName")]
    module_name: &'a str,
    #[serde(rename = "toVersion")]
    to_version: String,
}

#[derive(Debug, Deserialize)]
struct ApplyResponse {
    success: bool,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    #[serde(rename = "appliedVersion")]
    applied_version: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(rename = "latencyMs")]
    latency_ms: u32,
    #[serde(rename = "errorRate")]
    error_rate: f64,
    cpu: f64,
    mem: f64,
}

const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn deploy(
        &self,
        execution_id: ResourceId,
        node: &Node,
        module: &str,
        version: &Version,
        artifact_digest: &str,
        signature: &str,
    ) -> Result<NodeApplyResult> {
        let url = format!("{}/deploy", self.addresses.base_url(node));
        let body = DeployRequest {
            execution_id,
            module_name: module,
            version: version.to_string(),
            artifact_digest,
            signature,
        };
        let response = self
            .client
            .post(&url)
            .timeout(DEFAULT_APPLY_TIMEOUT)
            .header("traceparent", self.traceparent(execution_id))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let parsed: ApplyResponse = response.json().await.map_err(map_transport_error)?;
        parse_apply_response(parsed, version)
    }

    async fn rollback(
        &self,
        execution_id: ResourceId,
        node: &Node,
        module: &str,
        to_version: &Version,
    ) -> Result<NodeApplyResult> {
        let url = format!("{}/rollback", self.addresses.base_url(node));
        let body = RollbackRequest {
            execution_id,
            module_name: module,
            to_version: to_version.to_string(),
        };
        let response = self
            .client
            .post(&url)
            .timeout(DEFAULT_APPLY_TIMEOUT)
            .header("traceparent", self.traceparent(execution_id))
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;
        let parsed: ApplyResponse = response.json().await.map_err(map_transport_error)?;
        parse_apply_response(parsed, to_version)
    }

    async fn health_check(&self, node: &Node, timeout: Duration) -> Result<HealthSample> {
        let url = format!("{}/health", self.addresses.base_url(node));
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(node = %node.id, error = %e, "health check unreachable");
                Error::NodeTransient(format!("health check failed: {e}"))
            })?;
        let parsed: HealthResponse = response.json().await.map_err(map_transport_error)?;
        let status = match parsed.status.as_str() {
            "Healthy" | "healthy" => HealthStatus::Healthy,
            "Degraded" | "degraded" => HealthStatus::Degraded,
            "Unhealthy" | "unhealthy" => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        };
        debug!(node = %node.id, ?status, "health sampled");
        Ok(HealthSample {
            status,
            latency_ms: parsed.latency_ms,
            error_rate_pct: parsed.error_rate,
            cpu_pct: parsed.cpu,
            mem_pct: parsed.mem,
        })
    }
}

fn map_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::NodeTransient(format!("network error: {e}"))
    } else {
        Error::NodeTransient(format!("transport error: {e}"))
    }
}

fn parse_apply_response(parsed: ApplyResponse, requested: &Version) -> Result<NodeApplyResult> {
    if !parsed.success {
        let message = parsed.error.unwrap_or_else(|| "apply failed".to_string());
        if message.to_lowercase().contains("incompatible") {
            return Err(Error::NodePermanent(message));
        }
        if message.to_lowercase().contains("resource") {
            return Err(Error::NodeTransient(message));
        }
        return Err(Error::NodePermanent(message));
    }
    let applied_version = match parsed.applied_version {
        Some(v) => Version::parse(&v)?,
        None => requested.clone(),
    };
    Ok(NodeApplyResult {
        duration_ms: parsed.duration_ms,
        applied_version,
    })
}
