use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::scheduler::job::{Job, JobId, JobState};
use crate::store::JobStore;

/// How a claim attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The job is RUN and owned by this host.
    Claimed(Job),
    /// Another host got there first. This host's record changes, if any,
    /// were rolled back.
    LostRace,
    /// The claim was given up (interrupted, store error) and rolled back.
    Released,
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

/// Takes exclusive ownership of WAIT jobs through the shared store.
///
/// 1. WAIT -> LOCK(self), conditional on the job still being WAIT with the
///    host it was fetched with.
/// 2. Sleep `verify_delay` so concurrent lockers settle.
/// 3. Re-read; if still LOCK(self), LOCK -> RUN(self).
/// 4. Any failure after step 1 rolls back LOCK(self) -> WAIT, again conditionally.
///
/// The delay is a heuristic window. It does not protect against a store that
/// serves stale reads for longer than the delay.
#[derive(Clone)]
pub struct ClaimProtocol {
    store: Arc<dyn JobStore>,
    host: String,
    verify_delay: Duration,
}

impl ClaimProtocol {
    pub fn new(store: Arc<dyn JobStore>, host: impl Into<String>, verify_delay: Duration) -> Self {
        Self {
            store,
            host: host.into(),
            verify_delay,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Run the protocol for one candidate. Errors are only returned when the
    /// initial lock write fails; the job is untouched in that case.
    pub async fn claim(&self, job: Job, shutdown: &CancellationToken) -> Result<ClaimOutcome> {
        let id = job.id;
        let seen_host = job.host.clone();
        let mut locked = job;
        locked.transition(JobState::Lock, Some(self.host.clone()))?;

        // Conditional on the record being unchanged since it was fetched
        let applied = self
            .store
            .update_job_by_id_and_prev_state_and_host(
                &locked,
                id,
                JobState::Wait,
                seen_host.as_deref(),
            )
            .await?;
        if !applied {
            tracing::debug!(job_id = id, host = %self.host, "Lost race for job");
            return Ok(ClaimOutcome::LostRace);
        }

        let interrupted = tokio::select! {
            _ = tokio::time::sleep(self.verify_delay) => false,
            _ = shutdown.cancelled() => true,
        };
        if interrupted {
            tracing::warn!(job_id = id, host = %self.host, "Claim interrupted during verification");
            self.rollback(&locked).await;
            return Ok(ClaimOutcome::Released);
        }

        let current = match self.store.get_job_by_id(id).await {
            Ok(current) => current,
            Err(e) => {
                tracing::error!(job_id = id, error = %e, "Failed to verify job lock");
                self.rollback(&locked).await;
                return Ok(ClaimOutcome::Released);
            }
        };

        if !current.is_held_by(JobState::Lock, &self.host) {
            tracing::debug!(
                job_id = id,
                host = %self.host,
                state = %current.state,
                owner = ?current.host,
                "Lost race for job during verification"
            );
            self.rollback(&locked).await;
            return Ok(ClaimOutcome::LostRace);
        }

        let mut running = current;
        running.transition(JobState::Run, Some(self.host.clone()))?;
        running.start_time = Some(Utc::now());

        match self
            .store
            .update_job_by_id_and_prev_state_and_host(
                &running,
                id,
                JobState::Lock,
                Some(&self.host),
            )
            .await
        {
            Ok(true) => {
                tracing::info!(job_id = id, host = %self.host, "Job claimed");
                Ok(ClaimOutcome::Claimed(running))
            }
            Ok(false) => {
                tracing::debug!(job_id = id, host = %self.host, "Lock taken over before RUN");
                self.rollback(&locked).await;
                Ok(ClaimOutcome::LostRace)
            }
            Err(e) => {
                tracing::error!(job_id = id, error = %e, "Failed to mark job running");
                self.rollback(&locked).await;
                Ok(ClaimOutcome::Released)
            }
        }
    }

    /// LOCK(self) -> WAIT(null), only if the lock is still ours.
    async fn rollback(&self, locked: &Job) {
        let id: JobId = locked.id;
        let mut waiting = locked.clone();
        if let Err(e) = waiting.transition(JobState::Wait, None) {
            tracing::error!(job_id = id, error = %e, "Cannot build rollback record");
            return;
        }
        match self
            .store
            .update_job_by_id_and_prev_state_and_host(
                &waiting,
                id,
                JobState::Lock,
                Some(&self.host),
            )
            .await
        {
            Ok(true) => tracing::warn!(job_id = id, host = %self.host, "Claim rolled back"),
            Ok(false) => {
                tracing::debug!(job_id = id, host = %self.host, "Rollback skipped, lock no longer ours")
            }
            Err(e) => tracing::error!(job_id = id, error = %e, "Failed to roll back claim"),
        }
    }
}

impl std::fmt::Debug for ClaimProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimProtocol")
            .field("host", &self.host)
            .field("verify_delay", &self.verify_delay)
            .finish()
    }
}
