//! In-process task queue with priority lanes, retry and dead-letter handling.
//!
//! Models an at-least-once broker: a job is delivered until a handler settles
//! it, so handlers must be idempotent.
//!
//! ## Components
//!
//! - `Job`: tenant-scoped task with lane, payload, attempt counter and history
//! - `JobStore`: persistence for jobs and the dead-letter queue
//! - `JobExecutor`: tokio worker pool with weighted lanes, timeout and retry
//! - `RetryPolicy`: attempt budget and backoff, shared with the sync HTTP path

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{
    ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler, JobOutcome, LaneSchedule,
};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    Backoff, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
