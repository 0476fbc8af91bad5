//! KDL configuration parsing for the deployment orchestrator.
//!
//! Two documents are recognized at startup: the cluster topology (`cluster.rs`,
//! environment -> node list, feeding the C2 registry) and the runtime policy
//! (`policy.rs`, the flat `key = value` tunables enumerated in the external
//! interfaces configuration table).

pub mod cluster;
pub mod error;
pub mod policy;

pub use cluster::parse_cluster_topology;
pub use error::{ConfigError, ConfigResult};
pub use policy::{parse_runtime_config, EnvironmentOverride, RuntimeConfig};
