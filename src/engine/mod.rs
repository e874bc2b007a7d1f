//! Query engines and the registry that selects one by name.
//!
//! An engine receives the SQL text and the plan's options, runs the query to
//! completion, and reports success as a boolean. Engines own their output:
//! where rows go (see [`crate::output`]) is their business, not the
//! controller's.

pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::scheduler::job::{EngineOptions, JobId};

pub use sqlite::SqliteEngine;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid engine option {name}: {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

#[async_trait]
pub trait SqlEngine: Send + Sync {
    /// Run `sql` for job `job_id`. `Ok(false)` means the engine finished but
    /// did not consider the query successful.
    async fn execute(
        &self,
        job_id: JobId,
        sql: &str,
        options: &EngineOptions,
    ) -> Result<bool, EngineError>;
}

/// Engines keyed by upper-cased name.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn SqlEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, engine: Arc<dyn SqlEngine>) -> &mut Self {
        self.engines.insert(name.to_uppercase(), engine);
        self
    }

    pub fn with_engine(mut self, name: &str, engine: Arc<dyn SqlEngine>) -> Self {
        self.register(name, engine);
        self
    }

    /// Look up an engine. Names match case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn SqlEngine>> {
        self.engines.get(&name.to_uppercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}
