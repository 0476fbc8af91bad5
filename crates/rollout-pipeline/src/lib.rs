//! Pipeline executor (C9): the stage sequencing state machine that drives a
//! `DeploymentExecution` from Validate through Commit, delegating the Deploy
//! stage itself to `rollout-strategies` and persisting every resumable
//! decision point via `rollout-db`.

pub mod control;
pub mod executor;

pub use control::PipelineControl;
pub use executor::PipelineExecutor;
