use crate::error::Result;
use crate::scheduler::job::{Job, JobId, JobState};
use crate::store::JobStore;

/// Jobs reconciled by [`sweep_zombie_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// LOCK jobs returned to WAIT.
    pub released: Vec<JobId>,
    /// RUN jobs marked FAIL.
    pub failed: Vec<JobId>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.failed.is_empty()
    }
}

/// Reconcile jobs a previous run of this host left behind.
///
/// Only jobs whose `host` is `host` are touched. A LOCK never reached RUN, so
/// it goes back to WAIT for anyone to claim. A RUN may have partially
/// executed, so it becomes FAIL and keeps its host.
pub async fn sweep_zombie_jobs(store: &dyn JobStore, host: &str) -> Result<RecoveryReport> {
    let locked = ids(store.get_jobs_by_state_and_host(JobState::Lock, host).await?);
    if !locked.is_empty() {
        store
            .update_jobs_state_and_host_by_ids(JobState::Wait, None, &locked)
            .await?;
    }

    let running = ids(store.get_jobs_by_state_and_host(JobState::Run, host).await?);
    if !running.is_empty() {
        store
            .update_jobs_state_and_host_by_ids(JobState::Fail, Some(host), &running)
            .await?;
    }

    let report = RecoveryReport {
        released: locked,
        failed: running,
    };
    if report.is_empty() {
        tracing::info!(host, "No zombie jobs found");
    } else {
        tracing::info!(
            host,
            released = ?report.released,
            failed = ?report.failed,
            "Zombie jobs recovered"
        );
    }
    Ok(report)
}

fn ids(jobs: Vec<Job>) -> Vec<JobId> {
    jobs.into_iter().map(|j| j.id).collect()
}
