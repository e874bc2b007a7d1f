use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::engine::EngineRegistry;
use crate::error::Result;
use crate::scheduler::job::JobState;
use crate::scheduler::recovery::sweep_zombie_jobs;
use crate::scheduler::{ClaimScheduler, DispatchQueue};
use crate::store::JobStore;
use crate::worker::{JobExecutor, WorkerPool};

/// One controller instance: recovery sweep, claim scheduler and worker pool
/// sharing a dispatch queue.
pub struct Controller {
    pub config: ControllerConfig,
    store: Arc<dyn JobStore>,
    engines: Arc<EngineRegistry>,
    queue: Arc<DispatchQueue>,
}

impl Controller {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn JobStore>,
        engines: EngineRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(DispatchQueue::with_capacity(config.queue_capacity)?);
        Ok(Self {
            config,
            store,
            engines: Arc::new(engines),
            queue,
        })
    }

    pub fn queue(&self) -> Arc<DispatchQueue> {
        self.queue.clone()
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// 1. Sweeps zombie jobs left by a previous run of this host
    /// 2. Spawns the worker pool
    /// 3. Runs the claim scheduler on the current task
    /// 4. On shutdown, waits for workers to finish their current job and
    ///    fails whatever is still queued
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let host = self.config.host.clone();
        tracing::info!(
            host = %host,
            workers = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            engines = ?self.engines.names(),
            "Starting controller"
        );

        if let Err(e) = sweep_zombie_jobs(self.store.as_ref(), &host).await {
            tracing::error!(host = %host, error = %e, "Failed to clean zombie jobs");
        }

        let executor = JobExecutor::new(self.store.clone(), self.engines.clone());
        let pool = WorkerPool::spawn(
            self.config.worker_count,
            self.queue.clone(),
            executor,
            shutdown.clone(),
        );

        let scheduler = ClaimScheduler::new(&self.config, self.store.clone(), self.queue.clone());
        scheduler.run(shutdown).await;

        pool.join().await;
        self.fail_queued_jobs().await;
        tracing::info!(host = %host, "Controller stopped");
        Ok(())
    }

    /// Jobs still queued at shutdown are RUN on this host but will never be
    /// picked up. Record them as FAIL now instead of at the next start.
    async fn fail_queued_jobs(&self) -> usize {
        let mut failed = 0;
        while let Some(mut job) = self.queue.try_recv().await {
            let job_id = job.id;
            let owner = job.host.clone();
            if let Err(e) = job.transition(JobState::Fail, owner.clone()) {
                tracing::error!(job_id, error = %e, "Cannot fail queued job");
                continue;
            }
            job.end_time = Some(Utc::now());
            match self
                .store
                .update_job_by_id_and_prev_state_and_host(
                    &job,
                    job_id,
                    JobState::Run,
                    owner.as_deref(),
                )
                .await
            {
                Ok(true) => {
                    tracing::warn!(job_id, "Queued job failed at shutdown");
                    failed += 1;
                }
                Ok(false) => {
                    tracing::debug!(job_id, "Queued job changed in store, shutdown failure not applied")
                }
                Err(e) => tracing::error!(job_id, error = %e, "Failed to update job state"),
            }
        }
        failed
    }
}
