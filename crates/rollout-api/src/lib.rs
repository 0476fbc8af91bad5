//! HTTP facade (C10) for the deployment orchestrator.
//!
//! Exposes the command surface over JSON: create/get/list/rollback/cancel
//! a deployment, and record an approval decision. Every mutation goes
//! through the same validate -> idempotency -> lock -> persist path
//! described for `CreateDeployment`.

pub mod error;
pub mod events;
pub mod routes;
pub mod state;
pub mod ws;

pub use state::AppState;
