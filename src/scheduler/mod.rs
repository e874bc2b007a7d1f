pub mod claim;
pub mod job;
pub mod poller;
pub mod queue;
pub mod recovery;

pub use claim::{ClaimOutcome, ClaimProtocol};
pub use job::{EngineOptions, ExecutionPlan, Job, JobId, JobState};
pub use poller::ClaimScheduler;
pub use queue::DispatchQueue;
pub use recovery::{sweep_zombie_jobs, RecoveryReport};
