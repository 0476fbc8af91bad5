//! Application state: the facade's view of every component it dispatches
//! into (C3-C11), assembled once at startup and shared behind `Arc`s.

use std::sync::Arc;

use rollout_config::RuntimeConfig;
use rollout_core::event::EventSink;
use rollout_core::idempotency::IdempotencyStore;
use rollout_core::lock::DistributedLock;
use rollout_core::registry::ClusterRegistry;
use rollout_coordination::{PgDistributedLock, PgIdempotencyStore};
use rollout_db::{ApprovalRepo, ExecutionRepo, JobRepo, MessageRepo, PgApprovalRepo, PgExecutionRepo, PgJobRepo, PgMessageRepo};
use rollout_node::HttpNodeClient;
use rollout_pipeline::PipelineExecutor;
use rollout_scheduler::bus::MessageBus;
use rollout_strategies::params::StrategyParams;
use sqlx::PgPool;

use crate::events::FanOutSink;
use crate::ws::Broadcaster;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub executions: Arc<dyn ExecutionRepo>,
    pub approvals: Arc<dyn ApprovalRepo>,
    pub jobs: Arc<dyn JobRepo>,
    pub messages: Arc<MessageBus>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub lock: Arc<dyn DistributedLock>,
    pub registry: ClusterRegistry,
    pub executor: Arc<PipelineExecutor>,
    pub runtime_config: Arc<RuntimeConfig>,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        registry: ClusterRegistry,
        node_port: u16,
        verifier: Arc<dyn rollout_core::verify::Verifier>,
        runtime_config: RuntimeConfig,
    ) -> Self {
        let executions: Arc<dyn ExecutionRepo> = Arc::new(PgExecutionRepo::new(pool.clone()));
        let approvals: Arc<dyn ApprovalRepo> = Arc::new(PgApprovalRepo::new(pool.clone()));
        let jobs: Arc<dyn JobRepo> = Arc::new(PgJobRepo::new(pool.clone()));
        let message_repo: Arc<dyn MessageRepo> = Arc::new(PgMessageRepo::new(pool.clone()));
        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(PgIdempotencyStore::new(pool.clone()));
        let lock: Arc<dyn DistributedLock> =
            Arc::new(PgDistributedLock::new(pool.clone(), format!("rollout-api-{}", uuid::Uuid::new_v4())));
        let broadcaster = Arc::new(Broadcaster::new());
        let events: Arc<dyn EventSink> = Arc::new(FanOutSink::new(
            rollout_db::PgEventSink::new(pool.clone()),
            broadcaster.clone(),
        ));

        let node_client = Arc::new(HttpNodeClient::new(rollout_node::FixedPortAddressBook {
            port: node_port,
        }));

        let strategies = strategy_params_from(&runtime_config);
        let executor = Arc::new(PipelineExecutor {
            executions: executions.clone(),
            approvals: approvals.clone(),
            jobs: jobs.clone(),
            registry: registry.clone(),
            node_client,
            verifier,
            events,
            lock: lock.clone(),
            strategies,
        });

        Self {
            pool,
            executions,
            approvals,
            jobs,
            messages: Arc::new(MessageBus::new(message_repo)),
            idempotency,
            lock,
            registry,
            executor,
            runtime_config: Arc::new(runtime_config),
            broadcaster,
        }
    }
}

/// Merges the declarative per-strategy knobs (C12) onto `StrategyParams::default()`,
/// the same field-by-field override `RuntimeConfig::policy_for` applies to the
/// environment policy ladder.
fn strategy_params_from(runtime_config: &RuntimeConfig) -> StrategyParams {
    let mut params = StrategyParams::default();

    if let Some(batch_size) = runtime_config.rolling_batch_size {
        params.rolling.batch_size = Some(batch_size);
    }
    if let Some(threshold) = runtime_config.rolling_healthy_threshold {
        params.rolling.healthy_threshold = threshold;
    }

    if let Some(steps) = &runtime_config.canary_steps {
        params.canary.steps = steps.clone();
    }
    if let Some(seconds) = runtime_config.canary_observation_seconds {
        params.canary.step_observation_seconds = seconds;
    }
    if let Some(budget) = runtime_config.canary_error_budget_pct {
        params.canary.error_rate_budget_pct = budget;
    }

    if let Some(hold_seconds) = runtime_config.bluegreen_hold_seconds {
        params.blue_green.hold_seconds = hold_seconds;
    }

    params
}
