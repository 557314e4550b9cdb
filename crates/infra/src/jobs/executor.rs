//! Job executor with retry, timeout and weighted priority lanes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Handles one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult;

    /// Called after `handle` was abandoned for exceeding the task timeout.
    async fn timed_out(&self, _job: &Job, _after: Duration) {}
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> JobResult + Send + Sync,
{
    async fn handle(&self, job: &Job) -> JobResult {
        (self.0)(job)
    }
}

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How long an idle worker waits before polling again
    pub poll_interval: Duration,
    /// Number of worker tasks
    pub concurrency: usize,
    /// Upper bound on one handler run
    pub task_timeout: Duration,
    /// Lanes and their polling weights
    pub lanes: Vec<(String, u32)>,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            concurrency: 10,
            task_timeout: Duration::from_secs(30),
            lanes: vec![("critical".to_string(), 2), ("default".to_string(), 1)],
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lanes(mut self, lanes: Vec<(String, u32)>) -> Self {
        self.lanes = lanes;
        self
    }
}

/// Weighted round-robin over priority lanes.
///
/// A lane with weight `w` owns `w` slots. Each round starts one slot further
/// along and tries every distinct lane once, so `critical:2, default:1` under
/// load claims two critical jobs for every default one.
#[derive(Debug, Clone)]
pub struct LaneSchedule {
    slots: Vec<String>,
    cursor: usize,
}

impl LaneSchedule {
    pub fn weighted(lanes: &[(String, u32)]) -> Self {
        let slots = lanes
            .iter()
            .flat_map(|(lane, weight)| std::iter::repeat(lane.clone()).take((*weight).max(1) as usize))
            .collect();
        Self { slots, cursor: 0 }
    }

    /// Lanes to try this round, most preferred first.
    pub fn next_round(&mut self) -> Vec<&str> {
        if self.slots.is_empty() {
            return Vec::new();
        }
        let start = self.cursor;
        self.cursor = (self.cursor + 1) % self.slots.len();

        let mut order: Vec<&str> = Vec::new();
        for i in 0..self.slots.len() {
            let lane = self.slots[(start + i) % self.slots.len()].as_str();
            if !order.contains(&lane) {
                order.push(lane);
            }
        }
        order
    }
}

/// How a job run was settled in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Scheduled for redelivery after backoff.
    Retrying,
    DeadLettered,
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
    started: Instant,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for in-flight jobs to settle.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(err) = worker.await {
                error!(error = %err, "job worker panicked");
            }
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        let mut stats = lock(&self.stats).clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_timed_out: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

fn lock(stats: &Mutex<ExecutorStats>) -> std::sync::MutexGuard<'_, ExecutorStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background job executor.
///
/// Polls a job store for ready jobs, executes them with registered handlers,
/// and handles retries and dead-lettering.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    /// Create a new executor with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job kind (`"*"` matches any kind).
    pub fn register_handler(&mut self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Register a synchronous closure as a handler.
    pub fn register_fn<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.register_handler(kind, Arc::new(FnHandler(handler)));
    }

    fn handler_for(&self, kind: &JobKind) -> Option<Arc<dyn JobHandler>> {
        self.handlers
            .get(kind.type_name())
            .or_else(|| self.handlers.get("*"))
            .cloned()
    }

    /// Spawn `config.concurrency` worker tasks on the current runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let executor = Arc::new(self);
        let config = Arc::new(config);

        info!(
            executor = %config.name,
            concurrency = config.concurrency,
            lanes = ?config.lanes,
            "job executor started"
        );

        let workers = (0..config.concurrency.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    executor.clone(),
                    config.clone(),
                    worker,
                    shutdown_rx.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        JobExecutorHandle {
            shutdown: shutdown_tx,
            workers,
            stats,
            started: Instant::now(),
        }
    }

    /// Run one already-claimed job and settle it in the store.
    pub async fn execute_one(&self, job: &mut Job, timeout: Duration) -> Result<JobOutcome, JobStoreError> {
        let started = Utc::now();
        let (result, _) = self.run_handler(job, timeout).await;
        self.settle_durably(job, result, started).await
    }

    /// Returns the handler's verdict and whether the run hit the timeout.
    async fn run_handler(&self, job: &Job, timeout: Duration) -> (JobResult, bool) {
        let Some(handler) = self.handler_for(&job.kind) else {
            return (
                JobResult::Fatal(format!("no handler for job kind: {}", job.kind.type_name())),
                false,
            );
        };
        match tokio::time::timeout(timeout, handler.handle(job)).await {
            Ok(result) => (result, false),
            Err(_) => {
                warn!(job_id = %job.id, attempt = job.attempt, timeout_ms = timeout.as_millis() as u64, "job timed out");
                handler.timed_out(job, timeout).await;
                (JobResult::Failure(format!("timed out after {}ms", timeout.as_millis())), true)
            }
        }
    }

    fn settle(&self, job: &mut Job, result: JobResult, started: DateTime<Utc>) -> Result<JobOutcome, JobStoreError> {
        match result {
            JobResult::Success => {
                job.mark_completed(started);
                debug!(job_id = %job.id, "job completed successfully");
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, attempts = job.attempt, error = %error, "job dead-lettered");
                } else {
                    debug!(job_id = %job.id, attempt = job.attempt, scheduled_at = ?job.scheduled_at, "job scheduled for retry");
                }
            }
            JobResult::Fatal(error) => {
                job.mark_fatal(error.clone(), started);
                warn!(job_id = %job.id, attempts = job.attempt, error = %error, "job failed permanently; dead-lettered");
            }
        }
        self.persist(job)
    }

    /// Writes an already settled job to the store.
    fn persist(&self, job: &Job) -> Result<JobOutcome, JobStoreError> {
        match &job.status {
            JobStatus::DeadLettered { error, .. } => {
                self.store.dead_letter(job.clone(), error.clone())?;
                Ok(JobOutcome::DeadLettered)
            }
            JobStatus::Completed => {
                self.store.update(job)?;
                Ok(JobOutcome::Completed)
            }
            _ => {
                self.store.update(job)?;
                Ok(JobOutcome::Retrying)
            }
        }
    }

    /// Settles the run, re-writing it while the store keeps failing.
    ///
    /// A job left `Running` is never claimed again.
    async fn settle_durably(
        &self,
        job: &mut Job,
        result: JobResult,
        started: DateTime<Utc>,
    ) -> Result<JobOutcome, JobStoreError> {
        let mut outcome = self.settle(job, result, started);
        for attempt in 1..SETTLE_ATTEMPTS {
            let Err(err) = &outcome else { break };
            warn!(job_id = %job.id, attempt, error = %err, "failed to persist settled job; retrying");
            tokio::time::sleep(SETTLE_RETRY_DELAY * attempt).await;
            outcome = self.persist(job);
        }
        outcome
    }
}

/// Store writes per settled run before the worker gives up on it.
const SETTLE_ATTEMPTS: u32 = 5;
const SETTLE_RETRY_DELAY: Duration = Duration::from_millis(20);

async fn worker_loop<S: JobStore + 'static>(
    executor: Arc<JobExecutor<S>>,
    config: Arc<JobExecutorConfig>,
    worker: usize,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    let mut schedule = LaneSchedule::weighted(&config.lanes);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match claim(&executor.store, &mut schedule) {
            Ok(Some(mut job)) => {
                debug!(
                    executor = %config.name,
                    worker,
                    job_id = %job.id,
                    tenant_id = %job.tenant_id,
                    lane = %job.queue,
                    attempt = job.attempt,
                    kind = job.kind.type_name(),
                    "claimed job"
                );
                lock(&stats).current_running += 1;

                let started = Utc::now();
                let (result, timed_out) = executor.run_handler(&job, config.task_timeout).await;
                let outcome = executor.settle_durably(&mut job, result, started).await;

                let mut s = lock(&stats);
                s.current_running = s.current_running.saturating_sub(1);
                s.jobs_processed += 1;
                if timed_out {
                    s.jobs_timed_out += 1;
                }
                match outcome {
                    Ok(JobOutcome::Completed) => s.jobs_succeeded += 1,
                    Ok(JobOutcome::Retrying) => s.jobs_retried += 1,
                    Ok(JobOutcome::DeadLettered) => s.jobs_dead_lettered += 1,
                    Err(err) => {
                        error!(executor = %config.name, job_id = %job.id, error = %err, "failed to settle job")
                    }
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                error!(executor = %config.name, error = %err, "failed to claim job");
                tokio::time::sleep(config.poll_interval).await;
            }
        }
    }

    debug!(executor = %config.name, worker, "job worker stopped");
}

fn claim<S: JobStore>(store: &S, schedule: &mut LaneSchedule) -> Result<Option<Job>, JobStoreError> {
    for lane in schedule.next_round() {
        if let Some(job) = store.claim_next(lane)? {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use stockflow_core::TenantId;

    use crate::jobs::store::{InMemoryJobStore, JobStats};
    use crate::jobs::types::{DeadLetterEntry, JobId, RetryPolicy};

    fn job(lane: &str) -> Job {
        Job::new(TenantId::new(1), JobKind::custom("test"), lane, serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(1)))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..300 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn lane_schedule_prefers_heavier_lanes() {
        let mut schedule = LaneSchedule::weighted(&[("critical".to_string(), 2), ("default".to_string(), 1)]);

        let firsts: Vec<String> = (0..6).map(|_| schedule.next_round()[0].to_string()).collect();
        assert_eq!(firsts, ["critical", "critical", "default", "critical", "critical", "default"]);

        // Every round still falls through to the other lane
        assert_eq!(schedule.next_round(), vec!["critical", "default"]);
    }

    #[tokio::test]
    async fn execute_successful_job() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Success);

        store.enqueue(job("default")).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::Completed));
        assert!(matches!(claimed.status, JobStatus::Completed));
    }

    #[tokio::test]
    async fn failing_job_retries_then_dead_letters() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Failure("db down".to_string()));

        let id = store.enqueue(job("default")).unwrap();

        let mut claimed = store.claim_next("default").unwrap().unwrap();
        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::Retrying));

        // Skip backoff
        claimed.scheduled_at = None;
        store.update(&claimed).unwrap();

        let mut claimed = store.claim_next("default").unwrap().unwrap();
        assert_eq!(claimed.attempt, 2);
        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::DeadLettered));

        let dls = store.list_dead_letters(TenantId::new(1), 10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, id);
        assert_eq!(dls[0].reason, "db down");
    }

    #[tokio::test]
    async fn fatal_result_dead_letters_without_retry() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Fatal("insufficient stock".to_string()));

        store.enqueue(job("default").with_retry_policy(RetryPolicy::default())).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::DeadLettered));
        assert!(matches!(claimed.status, JobStatus::DeadLettered { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn unknown_kind_is_dead_lettered() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone());

        store.enqueue(job("default")).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::DeadLettered));
    }

    #[tokio::test]
    async fn wildcard_handler() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("*", |_job| JobResult::Success);

        store.enqueue(job("default")).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::Completed));
    }

    #[tokio::test]
    async fn spawned_executor_drains_lanes_by_weight() {
        let store = InMemoryJobStore::arc();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut executor = JobExecutor::new(store.clone());
        let record = seen.clone();
        executor.register_fn("test", move |job| {
            record.lock().unwrap().push(job.queue.clone());
            JobResult::Success
        });

        // Oldest job sits on the low-priority lane
        store.enqueue(job("default")).unwrap();
        store.enqueue(job("default")).unwrap();
        store.enqueue(job("critical")).unwrap();
        store.enqueue(job("critical")).unwrap();
        store.enqueue(job("critical")).unwrap();

        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_concurrency(1)
                .with_poll_interval(Duration::from_millis(5)),
        );
        wait_until(|| handle.stats().jobs_succeeded == 5).await;
        handle.shutdown().await;

        assert_eq!(
            *seen.lock().unwrap(),
            ["critical", "critical", "default", "critical", "default"]
        );
    }

    struct SlowFirstAttempt {
        timeouts: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for SlowFirstAttempt {
        async fn handle(&self, job: &Job) -> JobResult {
            if job.attempt == 1 {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            JobResult::Success
        }

        async fn timed_out(&self, _job: &Job, _after: Duration) {
            self.timeouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn timed_out_job_is_redelivered() {
        let store = InMemoryJobStore::arc();
        let handler = Arc::new(SlowFirstAttempt {
            timeouts: AtomicU32::new(0),
        });

        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("test", handler.clone());

        let id = store.enqueue(job("default")).unwrap();
        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_concurrency(1)
                .with_poll_interval(Duration::from_millis(5))
                .with_task_timeout(Duration::from_millis(50)),
        );

        let tenant = TenantId::new(1);
        wait_until(|| {
            matches!(
                store.get(tenant, id).unwrap().map(|j| j.status),
                Some(JobStatus::Completed)
            )
        })
        .await;
        let stats = handle.stats();
        handle.shutdown().await;

        let finished = store.get(tenant, id).unwrap().unwrap();
        assert_eq!(finished.attempt, 2);
        assert_eq!(handler.timeouts.load(Ordering::SeqCst), 1);
        assert_eq!(stats.jobs_timed_out, 1);
        assert_eq!(stats.jobs_retried, 1);
    }

    /// Fails the next `failing_writes` settle writes, then delegates.
    struct FlakyStore {
        inner: Arc<InMemoryJobStore>,
        failing_writes: AtomicU32,
    }

    impl FlakyStore {
        fn new(inner: Arc<InMemoryJobStore>, failing_writes: u32) -> Self {
            Self {
                inner,
                failing_writes: AtomicU32::new(failing_writes),
            }
        }

        fn fault(&self) -> Result<(), JobStoreError> {
            let left = self.failing_writes.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            self.failing_writes.store(left - 1, Ordering::SeqCst);
            Err(JobStoreError::Storage("connection reset".to_string()))
        }
    }

    impl JobStore for FlakyStore {
        fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
            self.inner.enqueue(job)
        }

        fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.inner.get(tenant_id, job_id)
        }

        fn update(&self, job: &Job) -> Result<(), JobStoreError> {
            self.fault()?;
            self.inner.update(job)
        }

        fn claim_next(&self, lane: &str) -> Result<Option<Job>, JobStoreError> {
            self.inner.claim_next(lane)
        }

        fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
            self.fault()?;
            self.inner.dead_letter(job, reason)
        }

        fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
            self.inner.list_dead_letters(tenant_id, limit)
        }

        fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
            self.inner.retry_dead_letter(tenant_id, job_id)
        }

        fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
            self.inner.delete_dead_letter(tenant_id, job_id)
        }

        fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
            self.inner.stats(tenant_id)
        }
    }

    #[tokio::test]
    async fn completion_survives_transient_store_errors() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(FlakyStore::new(store.clone(), 2));
        executor.register_fn("test", |_job| JobResult::Success);

        let id = store.enqueue(job("default")).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::Completed));
        let stored = store.get(TenantId::new(1), id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        // One run, however many writes it took
        assert_eq!(stored.history.len(), 1);
    }

    #[tokio::test]
    async fn dead_letter_write_is_retried() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(FlakyStore::new(store.clone(), 1));
        executor.register_fn("test", |_job| JobResult::Fatal("unknown tenant".to_string()));

        let id = store.enqueue(job("default")).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert_eq!(outcome, Ok(JobOutcome::DeadLettered));
        let dls = store.list_dead_letters(TenantId::new(1), 10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, id);
        assert_eq!(dls[0].reason, "unknown tenant");
    }

    #[tokio::test]
    async fn spawned_worker_requeues_failed_run_despite_store_error() {
        let store = InMemoryJobStore::arc();
        let runs = Arc::new(AtomicU32::new(0));

        let mut executor = JobExecutor::new(FlakyStore::new(store.clone(), 1));
        let counter = runs.clone();
        executor.register_fn("test", move |_job| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                JobResult::Failure("lock timeout".to_string())
            } else {
                JobResult::Success
            }
        });

        let id = store.enqueue(job("default")).unwrap();
        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_concurrency(1)
                .with_poll_interval(Duration::from_millis(5)),
        );

        let tenant = TenantId::new(1);
        wait_until(|| {
            matches!(
                store.get(tenant, id).unwrap().map(|j| j.status),
                Some(JobStatus::Completed)
            )
        })
        .await;
        handle.shutdown().await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_store_errors_are_reported() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(FlakyStore::new(store.clone(), u32::MAX));
        executor.register_fn("test", |_job| JobResult::Success);

        store.enqueue(job("default")).unwrap();
        let mut claimed = store.claim_next("default").unwrap().unwrap();

        let outcome = executor.execute_one(&mut claimed, Duration::from_secs(1)).await;
        assert!(matches!(outcome, Err(JobStoreError::Storage(_))));
    }
}
