//! Workers that run claimed jobs.
//!
//! - [`WorkerPool`]: N tasks, each taking one job at a time off the
//!   [`DispatchQueue`](crate::scheduler::DispatchQueue)
//! - [`JobExecutor`]: parses the plan, resolves the engine, runs the SQL and
//!   writes SUCC or FAIL back to the store
//!
//! Engine calls may run for hours, which is why they never happen on the
//! claim scheduler's task.

pub mod executor;
pub mod pool;

pub use executor::{ExecutionResult, JobExecutor};
pub use pool::WorkerPool;
