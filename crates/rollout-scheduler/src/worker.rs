//! Worker pool (C5): claims durable jobs with `SELECT ... FOR UPDATE SKIP
//! LOCKED`, acquires the per-(environment, module) deploy lock, and drives
//! the pipeline executor to a terminal status.

use std::sync::Arc;
use std::time::Duration;

use rollout_config::RuntimeConfig;
use rollout_core::job::{retry_backoff_from, Job, DEFAULT_LEASE, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL};
use rollout_core::lock::{deploy_lock_name, DistributedLock};
use rollout_db::{ExecutionRepo, JobRepo};
use rollout_pipeline::PipelineExecutor;
use tokio::time::sleep;
use tracing::{info, warn};

const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);
const DEFAULT_JOB_BACKOFF_BASE: Duration = Duration::from_secs(5);
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// A single worker loop. Run as many of these as the desired concurrency;
/// `SKIP LOCKED` guarantees no two workers ever claim the same job.
pub struct Worker {
    id: String,
    jobs: Arc<dyn JobRepo>,
    executions: Arc<dyn ExecutionRepo>,
    executor: Arc<PipelineExecutor>,
    lock: Arc<dyn DistributedLock>,
    runtime_config: Arc<RuntimeConfig>,
    poll_interval: Duration,
    lease: chrono::Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        jobs: Arc<dyn JobRepo>,
        executions: Arc<dyn ExecutionRepo>,
        executor: Arc<PipelineExecutor>,
        lock: Arc<dyn DistributedLock>,
        runtime_config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            id: id.into(),
            jobs,
            executions,
            executor,
            lock,
            runtime_config,
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease: chrono::Duration::from_std(DEFAULT_LEASE).expect("DEFAULT_LEASE fits in chrono::Duration"),
        }
    }

    pub async fn run(&self) {
        info!(worker_id = %self.id, "starting worker");
        loop {
            match self.jobs.claim(&self.id, self.lease).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => sleep(self.poll_interval).await,
                Err(e) => {
                    warn!(error = %e, "failed to claim job");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn process(&self, job: Job) {
        info!(job_id = %job.id, execution_id = %job.deployment_execution_id, "claimed job");

        let execution = match self.executions.get(job.deployment_execution_id).await {
            Ok(e) => e,
            Err(e) => {
                self.fail_job(&job, &e.to_string()).await;
                return;
            }
        };

        let lock_ttl = self.runtime_config.lock_ttl.unwrap_or(DEFAULT_LOCK_TTL);
        let lock_name = deploy_lock_name(execution.environment.as_str(), execution.module_name.as_str());
        let handle = match self.lock.acquire(&lock_name, lock_ttl, LOCK_WAIT).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                self.fail_job(&job, "deploy lock is held by another execution").await;
                return;
            }
            Err(e) => {
                self.fail_job(&job, &e.to_string()).await;
                return;
            }
        };

        let policy = self.runtime_config.policy_for(execution.environment);
        let result = self
            .executor
            .run(job.deployment_execution_id, job.id, handle, &policy)
            .await;

        match result {
            Ok(status) => {
                info!(job_id = %job.id, ?status, "pipeline run finished");
                if let Err(e) = self.jobs.complete(job.id).await {
                    warn!(job_id = %job.id, error = %e, "failed to mark job complete");
                }
            }
            Err(e) => self.fail_job(&job, &e.to_string()).await,
        }
    }

    async fn fail_job(&self, job: &Job, error: &str) {
        warn!(job_id = %job.id, %error, "job failed");
        let retry_count = job.retry_count + 1;
        let max_retries = job
            .max_retries
            .max(self.runtime_config.job_max_retries.unwrap_or(DEFAULT_MAX_RETRIES));
        let backoff_base = self
            .runtime_config
            .job_backoff_base
            .unwrap_or(DEFAULT_JOB_BACKOFF_BASE);
        let next_retry_at = if retry_count < max_retries {
            Some(chrono::Utc::now() + retry_backoff_from(retry_count, backoff_base))
        } else {
            None
        };
        if let Err(e) = self.jobs.fail(job.id, error, retry_count, next_retry_at).await {
            warn!(job_id = %job.id, error = %e, "failed to record job failure");
        }
    }
}
