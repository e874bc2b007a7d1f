use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::scheduler::queue::DispatchQueue;
use crate::worker::executor::JobExecutor;

/// Fixed set of workers draining the dispatch queue.
///
/// Each worker runs one job at a time. Shutdown is observed between jobs: a
/// running engine call is never interrupted.
pub struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        queue: Arc<DispatchQueue>,
        executor: JobExecutor,
        shutdown: CancellationToken,
    ) -> Self {
        let mut workers = JoinSet::new();
        for worker_id in 0..count {
            let queue = queue.clone();
            let executor = executor.clone();
            let shutdown = shutdown.clone();
            workers.spawn(async move {
                Self::worker_loop(worker_id, queue, executor, shutdown).await;
            });
        }
        tracing::info!(workers = count, "Worker pool started");
        Self { workers }
    }

    async fn worker_loop(
        worker_id: usize,
        queue: Arc<DispatchQueue>,
        executor: JobExecutor,
        shutdown: CancellationToken,
    ) {
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = queue.recv() => job,
            };
            let Some(job) = job else {
                break;
            };
            tracing::debug!(worker_id, job_id = job.id, "Worker picked up job");
            executor.execute(job).await;
        }
        tracing::debug!(worker_id, "Worker stopped");
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
    }
}
