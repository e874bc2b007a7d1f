use thiserror::Error;

use crate::engine::EngineError;
use crate::scheduler::job::{JobId, JobState};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {0} is already in a terminal state")]
    TerminalJob(JobId),

    #[error("Invalid state transition {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Store error: {0}")]
    Store(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to parse execution plan: {0}")]
    PlanParse(#[from] serde_json::Error),

    #[error("Not supported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
