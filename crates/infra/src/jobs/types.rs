//! Task model: identity, lifecycle state and the retry budget.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::TenantId;
use stockflow_inventory::TASK_DEDUCT_STOCK;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Task type; selects the handler a worker dispatches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    DeductStock,
    Custom { kind: String },
}

impl JobKind {
    pub fn custom(kind: impl Into<String>) -> Self {
        Self::Custom { kind: kind.into() }
    }

    /// Wire name, e.g. `order:deduct_stock`.
    pub fn type_name(&self) -> &str {
        match self {
            Self::DeductStock => TASK_DEDUCT_STOCK,
            Self::Custom { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Last run failed; redelivered once `scheduled_at` passes.
    Retrying { error: String, attempt: u32 },
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::DeadLettered { .. })
    }

    /// Waiting for a worker, first delivery or redelivery.
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Pending | Self::Retrying { .. })
    }
}

/// Delay between a failed run and its redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Backoff {
    Fixed { delay: Duration },
    /// Doubles per failed run, starting at `base`, never above `cap`.
    Exponential { base: Duration, cap: Duration },
}

/// How many times a task may run.
///
/// `max_attempts` includes the first run, so `MaxRetry = n` maps to `n + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::for_max_retry(10, Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    pub fn for_max_retry(max_retry: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_retry.saturating_add(1),
            backoff: Backoff::Exponential { base, cap },
        }
    }

    /// Wait before the run following failed run number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Fixed { delay } => delay,
            Backoff::Exponential { base, cap } => {
                let factor = 1u32 << (attempt - 1).min(20);
                base.checked_mul(factor).map_or(cap, |d| d.min(cap))
            }
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// One queued unit of work, owned by a tenant and routed to a lane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    /// Priority lane.
    pub queue: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Runs started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not claimable before this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

impl Job {
    pub fn new(tenant_id: TenantId, kind: JobKind, queue: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            kind,
            queue: queue.into(),
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.scheduled_at = Some(after(Utc::now(), delay));
        self
    }

    pub fn is_ready(&self) -> bool {
        self.scheduled_at.is_none_or(|at| at <= Utc::now())
    }

    pub fn has_retries_left(&self) -> bool {
        self.retry_policy.should_retry(self.attempt)
    }

    /// Starts a run; bumps the attempt counter.
    pub fn mark_running(&mut self) {
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let finished_at = self.finish(started_at, None);
        self.status = JobStatus::Completed;
        self.scheduled_at = None;
        self.updated_at = finished_at;
    }

    /// Schedules a redelivery while the budget lasts, dead-letters otherwise.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        if !self.has_retries_left() {
            return self.mark_fatal(error, started_at);
        }
        let finished_at = self.finish(started_at, Some(error.clone()));
        let delay = self.retry_policy.delay_for_attempt(self.attempt);
        self.scheduled_at = Some(after(finished_at, delay));
        self.status = JobStatus::Retrying {
            error,
            attempt: self.attempt,
        };
        self.updated_at = finished_at;
    }

    /// Dead-letters regardless of the remaining budget.
    pub fn mark_fatal(&mut self, error: String, started_at: DateTime<Utc>) {
        let finished_at = self.finish(started_at, Some(error.clone()));
        self.status = JobStatus::DeadLettered {
            error,
            attempts: self.attempt,
        };
        self.updated_at = finished_at;
    }

    fn finish(&mut self, started_at: DateTime<Utc>, error: Option<String>) -> DateTime<Utc> {
        let finished_at = Utc::now();
        let duration_ms = u64::try_from((finished_at - started_at).num_milliseconds()).unwrap_or(0);
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
            duration_ms,
        });
        finished_at
    }
}

/// Handler verdict for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Retryable; dead-lettered once the budget is spent.
    Failure(String),
    /// Not retryable; dead-lettered now.
    Fatal(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}
