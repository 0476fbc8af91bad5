//! Worker pool (C5), message bus (C6), and background sweepers tying
//! `rollout-pipeline` and `rollout-db` into a runnable orchestrator service.

pub mod bus;
pub mod sweeper;
pub mod worker;

pub use bus::{MessageBus, PublishRequest};
pub use sweeper::Sweeper;
pub use worker::Worker;
