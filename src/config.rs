use std::time::Duration;

use crate::error::{RelayError, Result};

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_WORKER_COUNT: usize = 4;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_VERIFY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Settings for one controller instance.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Identity recorded in the `host` column of every job this instance claims.
    /// Must be stable across restarts for recovery to find its own jobs.
    pub host: String,
    /// Claimed jobs waiting for (or being claimed for) a worker.
    pub queue_capacity: usize,
    pub worker_count: usize,
    /// Pause between store polls for WAIT jobs.
    pub poll_interval_ms: u64,
    /// Pause between taking the LOCK and checking nobody else took it.
    pub verify_delay_ms: u64,
    /// Maximum WAIT jobs fetched per poll.
    pub batch_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            worker_count: DEFAULT_WORKER_COUNT,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            verify_delay_ms: DEFAULT_VERIFY_DELAY_MS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ControllerConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_verify_delay_ms(mut self, ms: u64) -> Self {
        self.verify_delay_ms = ms;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn verify_delay(&self) -> Duration {
        Duration::from_millis(self.verify_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(RelayError::Config("host must not be empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(RelayError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RelayError::Config("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
