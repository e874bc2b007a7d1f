use std::sync::Arc;

use chrono::Utc;

use crate::engine::{EngineError, EngineRegistry};
use crate::error::{RelayError, Result};
use crate::scheduler::job::{ExecutionPlan, Job, JobId, JobState};
use crate::store::JobStore;

/// Result of job execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job_id: JobId,
    pub state: JobState,
    pub error: Option<String>,
    /// Whether the terminal state reached the store.
    pub persisted: bool,
}

/// Runs one claimed job to SUCC or FAIL.
///
/// Any failure (unparseable plan, unknown engine, engine error or panic) ends
/// in FAIL and is contained here. The engine is called at most once.
#[derive(Clone)]
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    engines: Arc<EngineRegistry>,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>, engines: Arc<EngineRegistry>) -> Self {
        Self { store, engines }
    }

    /// Execute a RUN job and persist its terminal state.
    pub async fn execute(&self, job: Job) -> ExecutionResult {
        let job_id = job.id;
        let (state, error) = match self.run(&job).await {
            Ok(true) => (JobState::Succ, None),
            Ok(false) => (JobState::Fail, Some("engine reported failure".to_string())),
            Err(e) => (JobState::Fail, Some(e.to_string())),
        };

        let persisted = self.finish(job, state).await;
        tracing::info!(job_id, state = %state, persisted, "Job finished");

        ExecutionResult {
            job_id,
            state,
            error,
            persisted,
        }
    }

    async fn run(&self, job: &Job) -> Result<bool> {
        let plan = match job.plan() {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(
                    job_id = job.id,
                    plan = %job.execution_plan,
                    error = %e,
                    "Failed to parse execution plan"
                );
                return Err(e);
            }
        };

        let Some(engine) = self.engines.resolve(&plan.engine) else {
            tracing::error!(
                job_id = job.id,
                engine = %plan.engine,
                plan = %job.execution_plan,
                "Not supported engine"
            );
            return Err(RelayError::UnsupportedEngine(plan.engine));
        };

        let job_id = job.id;
        let ExecutionPlan {
            engine: engine_name,
            sql,
            options,
        } = plan;
        tracing::info!(job_id, engine = %engine_name, sql = %sql, "Executing job");

        let task_sql = sql.clone();
        let handle =
            tokio::spawn(async move { engine.execute(job_id, &task_sql, &options).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(EngineError::Execution(format!("engine task aborted: {}", e))),
        };

        outcome.map_err(|e| {
            tracing::error!(job_id, engine = %engine_name, sql = %sql, error = %e, "Failed to execute sql");
            RelayError::Engine(e)
        })
    }

    /// Write `{state, end_time}` if the job is still RUN and owned by the
    /// host that claimed it. Failures are logged, not retried.
    async fn finish(&self, job: Job, state: JobState) -> bool {
        let job_id = job.id;
        let owner = job.host.clone();
        let mut finished = job;
        if let Err(e) = finished.transition(state, owner.clone()) {
            tracing::error!(job_id, error = %e, "Refusing to finish job");
            return false;
        }
        finished.end_time = Some(Utc::now());

        match self
            .store
            .update_job_by_id_and_prev_state_and_host(
                &finished,
                job_id,
                JobState::Run,
                owner.as_deref(),
            )
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(job_id, state = %state, "Failed to update job state, job no longer RUN on this host");
                false
            }
            Err(e) => {
                tracing::error!(job_id, state = %state, error = %e, "Failed to update job state");
                false
            }
        }
    }
}
