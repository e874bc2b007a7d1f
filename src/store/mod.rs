//! Persistent job storage shared by every controller instance.
//!
//! The store is the only place job state lives. All coordination between
//! hosts goes through [`JobStore::update_job_by_id_and_prev_state_and_host`],
//! a compare-and-swap on `(state, host)`.
//!
//! Every implementation must refuse to rewrite a job that has reached SUCC or
//! FAIL:
//! - unconditional updates return [`RelayError::TerminalJob`](crate::error::RelayError::TerminalJob)
//! - conditional updates return `Ok(false)`
//! - bulk updates skip the terminal rows

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::scheduler::job::{Job, JobId, JobState};

pub use memory::MemoryJobStore;
pub use sqlite::{NewJob, SqliteJobStore};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Up to `limit` jobs currently in `state`, in store order.
    async fn get_jobs_by_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>>;

    async fn get_job_by_id(&self, id: JobId) -> Result<Job>;

    async fn get_jobs_by_state_and_host(&self, state: JobState, host: &str) -> Result<Vec<Job>>;

    /// Overwrite the record with `job`.
    async fn update_job_by_id(&self, job: &Job, id: JobId) -> Result<()>;

    /// Overwrite the record only if it is still in `prev_state` owned by
    /// `prev_host` (`None` matches an unowned job). Returns whether the
    /// write was applied.
    async fn update_job_by_id_and_prev_state_and_host(
        &self,
        job: &Job,
        id: JobId,
        prev_state: JobState,
        prev_host: Option<&str>,
    ) -> Result<bool>;

    /// Set state and host on every listed job. Returns the number of rows changed.
    async fn update_jobs_state_and_host_by_ids(
        &self,
        state: JobState,
        host: Option<&str>,
        ids: &[JobId],
    ) -> Result<usize>;
}
