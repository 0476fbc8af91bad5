//! Node client transports.
//!
//! Provides implementations of `rollout_core::node::NodeClient`:
//! - `http` — the real node-agent protocol over HTTP, per the external
//!   interfaces spec (`POST /deploy`, `POST /rollback`, `GET /health`).
//! - `mock` — an in-memory, scriptable client for tests.

pub mod http;
pub mod mock;
pub mod verify;

pub use http::{FixedPortAddressBook, HttpNodeClient, NodeAddressBook};
pub use mock::MockNodeClient;
pub use verify::HmacVerifier;
