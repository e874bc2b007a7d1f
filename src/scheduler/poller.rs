use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::OwnedPermit;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::ControllerConfig;
use crate::error::Result;
use crate::scheduler::claim::{ClaimOutcome, ClaimProtocol};
use crate::scheduler::job::{Job, JobState};
use crate::scheduler::queue::DispatchQueue;
use crate::store::JobStore;

/// Polls the store for WAIT jobs and feeds claimed ones into the dispatch queue.
pub struct ClaimScheduler {
    store: Arc<dyn JobStore>,
    queue: Arc<DispatchQueue>,
    protocol: ClaimProtocol,
    batch_size: usize,
    poll_interval: Duration,
}

impl ClaimScheduler {
    pub fn new(
        config: &ControllerConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<DispatchQueue>,
    ) -> Self {
        Self {
            protocol: ClaimProtocol::new(store.clone(), config.host.clone(), config.verify_delay()),
            store,
            queue,
            batch_size: config.batch_size,
            poll_interval: config.poll_interval(),
        }
    }

    /// Poll until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(host = %self.protocol.host(), "Claim scheduler started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.poll_once(&shutdown).await {
                tracing::error!(error = %e, "Failed to get WAIT jobs");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        tracing::info!(host = %self.protocol.host(), "Claim scheduler stopped");
    }

    /// Fetch one batch and claim as many candidates as the queue has room
    /// for. Returns the number of jobs claimed and queued.
    ///
    /// Each candidate takes a queue slot before its claim starts, so a burst
    /// of candidates can never claim more than the free capacity. Attempts
    /// within a batch run concurrently, and a slot given back by a lost or
    /// released claim goes to the next deferred candidate.
    pub async fn poll_once(&self, shutdown: &CancellationToken) -> Result<usize> {
        let candidates = self
            .store
            .get_jobs_by_state(JobState::Wait, self.batch_size)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut pending = candidates.into_iter().peekable();
        let mut attempts = JoinSet::new();
        let mut claimed = 0;
        loop {
            while pending.peek().is_some() && !shutdown.is_cancelled() {
                let Some(permit) = self.queue.try_reserve() else {
                    tracing::debug!(queued = self.queue.len(), "Dispatch queue full, deferring candidates");
                    break;
                };
                let Some(job) = pending.next() else {
                    break;
                };
                self.spawn_claim(&mut attempts, job, permit, shutdown);
            }

            match attempts.join_next().await {
                Some(Ok(true)) => claimed += 1,
                Some(Ok(false)) => {}
                Some(Err(e)) => tracing::error!(error = %e, "Claim task failed"),
                None => break,
            }
        }
        if claimed > 0 {
            tracing::debug!(claimed, queued = self.queue.len(), "Poll cycle finished");
        }
        Ok(claimed)
    }

    /// The permit is consumed by a successful claim and dropped otherwise,
    /// so the slot is free again by the time the task is joined.
    fn spawn_claim(
        &self,
        attempts: &mut JoinSet<bool>,
        job: Job,
        permit: OwnedPermit<Job>,
        shutdown: &CancellationToken,
    ) {
        let protocol = self.protocol.clone();
        let shutdown = shutdown.clone();
        attempts.spawn(async move {
            let job_id = job.id;
            match protocol.claim(job, &shutdown).await {
                Ok(ClaimOutcome::Claimed(job)) => {
                    permit.send(job);
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    tracing::error!(job_id, error = %e, "Failed to claim job");
                    false
                }
            }
        });
    }
}
