//! Task storage: live tasks plus the dead-letter set.
//!
//! Every read or mutation that takes a tenant answers only for that tenant's
//! tasks. `claim_next` is the worker side and is tenant-agnostic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::Serialize;

use stockflow_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Live or dead-lettered task.
    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Persists the state of a live task.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Oldest ready task on `lane`, marked running.
    fn claim_next(&self, lane: &str) -> Result<Option<Job>, JobStoreError>;

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Requeues a dead letter as pending with a fresh attempt budget.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// The task exists but belongs to another tenant.
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-tenant queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub retrying: usize,
    pub dead_lettered: usize,
    /// Tasks waiting for a worker, by lane.
    pub queued_by_lane: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
struct Queues {
    live: HashMap<JobId, Job>,
    dead: HashMap<JobId, DeadLetterEntry>,
}

impl Queues {
    /// Dead letter owned by `tenant_id`, or the reason it can't be touched.
    fn owned_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<&DeadLetterEntry, JobStoreError> {
        match self.dead.get(&job_id) {
            None => Err(JobStoreError::NotFound(job_id)),
            Some(entry) if entry.job.tenant_id != tenant_id => Err(JobStoreError::TenantIsolation),
            Some(entry) => Ok(entry),
        }
    }
}

/// Process-local store; all state lives behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Queues>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> RwLockReadGuard<'_, Queues> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Queues> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut queues = self.write();
        let id = job.id;
        if queues.live.contains_key(&id) || queues.dead.contains_key(&id) {
            return Err(JobStoreError::AlreadyExists(id));
        }
        queues.live.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let queues = self.read();
        let found = queues
            .live
            .get(&job_id)
            .or_else(|| queues.dead.get(&job_id).map(|entry| &entry.job));

        match found {
            None => Ok(None),
            Some(job) if job.tenant_id != tenant_id => Err(JobStoreError::TenantIsolation),
            Some(job) => Ok(Some(job.clone())),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut queues = self.write();
        let slot = queues.live.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, lane: &str) -> Result<Option<Job>, JobStoreError> {
        let mut queues = self.write();

        let Some(id) = queues
            .live
            .values()
            .filter(|job| job.queue == lane && job.status.is_queued() && job.is_ready())
            .min_by_key(|job| (job.created_at, job.id.as_uuid()))
            .map(|job| job.id)
        else {
            return Ok(None);
        };

        Ok(queues.live.get_mut(&id).map(|job| {
            job.mark_running();
            job.clone()
        }))
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        if !matches!(job.status, JobStatus::DeadLettered { .. }) {
            job.status = JobStatus::DeadLettered {
                error: reason.clone(),
                attempts: job.attempt,
            };
            job.updated_at = Utc::now();
        }

        let mut queues = self.write();
        queues.live.remove(&job.id);
        queues.dead.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let mut entries: Vec<_> = self
            .read()
            .dead
            .values()
            .filter(|entry| entry.job.tenant_id == tenant_id)
            .cloned()
            .collect();

        entries.sort_by_key(|entry| (entry.dead_lettered_at, entry.job.id.as_uuid()));
        entries.truncate(limit);
        Ok(entries)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut queues = self.write();
        queues.owned_dead_letter(tenant_id, job_id)?;
        let Some(DeadLetterEntry { mut job, .. }) = queues.dead.remove(&job_id) else {
            return Err(JobStoreError::NotFound(job_id));
        };

        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.history.clear();
        job.updated_at = Utc::now();

        queues.live.insert(job_id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
        let mut queues = self.write();
        queues.owned_dead_letter(tenant_id, job_id)?;
        queues.dead.remove(&job_id);
        Ok(())
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let queues = self.read();
        let mut stats = JobStats {
            dead_lettered: queues.dead.values().filter(|e| e.job.tenant_id == tenant_id).count(),
            ..JobStats::default()
        };

        for job in queues.live.values().filter(|job| job.tenant_id == tenant_id) {
            let counter = match job.status {
                JobStatus::Pending => &mut stats.pending,
                JobStatus::Running => &mut stats.running,
                JobStatus::Completed => &mut stats.completed,
                JobStatus::Retrying { .. } => &mut stats.retrying,
                JobStatus::DeadLettered { .. } => &mut stats.dead_lettered,
            };
            *counter += 1;

            if job.status.is_queued() {
                *stats.queued_by_lane.entry(job.queue.clone()).or_default() += 1;
            }
        }

        Ok(stats)
    }
}

impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, lane: &str) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(lane)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id)
    }

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(tenant_id, job_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}
