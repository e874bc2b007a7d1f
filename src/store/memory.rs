use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{RelayError, Result};
use crate::scheduler::job::{Job, JobId, JobState};
use crate::store::JobStore;

/// In-process job store.
///
/// Behaves like a shared database for any number of controllers holding the
/// same `Arc`. Besides the terminal-state rule every store follows, it also
/// rejects writes that skip a state machine edge (e.g. WAIT -> RUN).
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a job, bypassing all checks.
    pub async fn insert(&self, job: Job) {
        self.jobs.write().await.insert(job.id, job);
    }

    /// Copy of every job, ordered by id.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

fn check_write(current: &Job, next: &Job) -> Result<()> {
    if current.state.is_terminal() {
        return Err(RelayError::TerminalJob(current.id));
    }
    if current.state != next.state && !current.state.can_transition_to(next.state) {
        return Err(RelayError::InvalidTransition {
            from: current.state,
            to: next.state,
        });
    }
    Ok(())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_jobs_by_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.state == state)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_job_by_id(&self, id: JobId) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RelayError::JobNotFound(id))
    }

    async fn get_jobs_by_state_and_host(&self, state: JobState, host: &str) -> Result<Vec<Job>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|j| j.state == state && j.host.as_deref() == Some(host))
            .cloned()
            .collect())
    }

    async fn update_job_by_id(&self, job: &Job, id: JobId) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let current = jobs.get_mut(&id).ok_or(RelayError::JobNotFound(id))?;
        check_write(current, job)?;
        *current = Job { id, ..job.clone() };
        Ok(())
    }

    async fn update_job_by_id_and_prev_state_and_host(
        &self,
        job: &Job,
        id: JobId,
        prev_state: JobState,
        prev_host: Option<&str>,
    ) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let current = jobs.get_mut(&id).ok_or(RelayError::JobNotFound(id))?;
        if current.state.is_terminal()
            || current.state != prev_state
            || current.host.as_deref() != prev_host
        {
            return Ok(false);
        }
        check_write(current, job)?;
        *current = Job { id, ..job.clone() };
        Ok(true)
    }

    async fn update_jobs_state_and_host_by_ids(
        &self,
        state: JobState,
        host: Option<&str>,
        ids: &[JobId],
    ) -> Result<usize> {
        let mut jobs = self.jobs.write().await;
        let mut changed = 0;
        for id in ids {
            if let Some(job) = jobs.get_mut(id) {
                if job.state.is_terminal() {
                    continue;
                }
                job.state = state;
                job.host = host.map(str::to_string);
                changed += 1;
            }
        }
        Ok(changed)
    }
}
