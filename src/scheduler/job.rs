use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

pub type JobId = i64;

/// Engine-specific options carried in an execution plan.
pub type EngineOptions = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Wait,
    Lock,
    Run,
    Succ,
    Fail,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Wait => "WAIT",
            JobState::Lock => "LOCK",
            JobState::Run => "RUN",
            JobState::Succ => "SUCC",
            JobState::Fail => "FAIL",
        }
    }

    /// SUCC and FAIL accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succ | JobState::Fail)
    }

    /// States in which a job is owned by some host.
    pub fn is_owned(&self) -> bool {
        matches!(self, JobState::Lock | JobState::Run)
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Wait, JobState::Lock)
                | (JobState::Lock, JobState::Run)
                | (JobState::Lock, JobState::Wait)
                | (JobState::Run, JobState::Succ)
                | (JobState::Run, JobState::Fail)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state: {0}")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "WAIT" => Ok(JobState::Wait),
            "LOCK" => Ok(JobState::Lock),
            "RUN" => Ok(JobState::Run),
            "SUCC" => Ok(JobState::Succ),
            "FAIL" => Ok(JobState::Fail),
            other => Err(ParseJobStateError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub user_id: String,
    pub state: JobState,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub query_term: Option<String>,
    pub execution_plan: String,
    pub host: Option<String>,
    pub report_url: Option<String>,
}

impl Job {
    /// A freshly submitted job in WAIT with no owner.
    pub fn new(id: JobId, user_id: impl Into<String>, execution_plan: impl Into<String>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            state: JobState::Wait,
            submit_time: Utc::now(),
            start_time: None,
            end_time: None,
            query_term: None,
            execution_plan: execution_plan.into(),
            host: None,
            report_url: None,
        }
    }

    /// Move to `next`, updating state and host together.
    pub fn transition(&mut self, next: JobState, host: Option<String>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(RelayError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.host = host;
        Ok(())
    }

    pub fn is_held_by(&self, state: JobState, host: &str) -> bool {
        self.state == state && self.host.as_deref() == Some(host)
    }

    pub fn plan(&self) -> Result<ExecutionPlan> {
        ExecutionPlan::parse(&self.execution_plan)
    }
}

/// The serialized work description stored with each job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub engine: String,
    pub sql: String,
    #[serde(default)]
    pub options: EngineOptions,
}

impl ExecutionPlan {
    pub fn new(engine: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            sql: sql.into(),
            options: EngineOptions::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
