use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use stockflow_core::{OrderId, TenantId};
use stockflow_events::Reporter;
use stockflow_infra::{
    config::AppConfig,
    jobs::{
        InMemoryJobStore, Job, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler, JobKind, JobStore,
        JobStoreError, RetryPolicy,
    },
    ledger::{
        DeductionReceipt, InMemoryLedgerStore, IssueReceipt, LedgerEngine, LedgerError, OrderReader, PgLedgerStore,
    },
    sinks::build_reporter,
    workers::DeductStockWorker,
};
use stockflow_inventory::{AcceptedOrder, DeductionTask, Order, StockIssue, TASK_DEDUCT_STOCK, TaskIntake};

/// Ledger engine over the configured backend.
#[derive(Clone)]
pub enum Ledger {
    InMemory(Arc<LedgerEngine<InMemoryLedgerStore>>),
    Postgres(Arc<LedgerEngine<PgLedgerStore>>),
}

impl Ledger {
    pub fn in_memory(store: InMemoryLedgerStore) -> Self {
        Ledger::InMemory(Arc::new(LedgerEngine::new(store)))
    }

    pub fn postgres(store: PgLedgerStore) -> Self {
        Ledger::Postgres(Arc::new(LedgerEngine::new(store)))
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Ledger::InMemory(_) => "in_memory",
            Ledger::Postgres(_) => "postgres",
        }
    }

    pub async fn deduct(&self, task: &DeductionTask, policy: &RetryPolicy) -> Result<DeductionReceipt, LedgerError> {
        match self {
            Ledger::InMemory(engine) => engine.deduct_with_retry(task, policy).await,
            Ledger::Postgres(engine) => engine.deduct_with_retry(task, policy).await,
        }
    }

    pub async fn issue(&self, issue: &StockIssue, policy: &RetryPolicy) -> Result<IssueReceipt, LedgerError> {
        match self {
            Ledger::InMemory(engine) => engine.issue_with_retry(issue, policy).await,
            Ledger::Postgres(engine) => engine.issue_with_retry(issue, policy).await,
        }
    }

    pub async fn find_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, LedgerError> {
        let found = match self {
            Ledger::InMemory(engine) => engine.store().find_order(tenant_id, order_id).await,
            Ledger::Postgres(engine) => engine.store().find_order(tenant_id, order_id).await,
        };
        Ok(found?)
    }

    fn worker(&self, intake: TaskIntake, reporter: Reporter) -> Arc<dyn JobHandler> {
        match self {
            Ledger::InMemory(engine) => Arc::new(DeductStockWorker::new(engine.clone(), intake, reporter)),
            Ledger::Postgres(engine) => Arc::new(DeductStockWorker::new(engine.clone(), intake, reporter)),
        }
    }
}

/// Everything the HTTP handlers share.
pub struct AppServices {
    ledger: Ledger,
    jobs: Arc<InMemoryJobStore>,
    intake: TaskIntake,
    reporter: Reporter,
    task_retry: RetryPolicy,
    sync_retry: RetryPolicy,
}

impl AppServices {
    pub fn new(ledger: Ledger, reporter: Reporter, config: &AppConfig) -> Self {
        Self {
            ledger,
            jobs: InMemoryJobStore::arc(),
            intake: TaskIntake::new(config.queue.lane_names(), config.queue.default_lane.clone()),
            reporter,
            task_retry: config.queue.retry_policy(),
            sync_retry: config.ledger.sync_retry_policy(),
        }
    }

    /// Connect the configured backend and sinks.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let reporter = build_reporter(&config.sinks).context("failed to configure outcome sinks")?;

        let url = config.database.url.as_deref().filter(|u| !u.trim().is_empty());
        let ledger = match url {
            Some(url) => {
                let store = PgLedgerStore::connect(
                    url,
                    config.database.max_connections,
                    config.database.acquire_timeout(),
                )
                .await
                .context("failed to connect to Postgres")?;
                if config.database.migrate {
                    store.migrate().await.context("failed to apply ledger schema")?;
                }
                info!(max_connections = config.database.max_connections, "using postgres ledger store");
                Ledger::postgres(store)
            }
            None => {
                warn!("no database url configured; using in-memory ledger store");
                Ledger::in_memory(InMemoryLedgerStore::new())
            }
        };

        Ok(Self::new(ledger, reporter, config))
    }

    /// Start the queue workers with the deduction handler registered.
    pub fn spawn_workers(&self, config: JobExecutorConfig) -> JobExecutorHandle {
        let mut executor = JobExecutor::new(self.jobs.clone());
        executor.register_handler(TASK_DEDUCT_STOCK, self.ledger.worker(self.intake.clone(), self.reporter.clone()));
        executor.spawn(config)
    }

    /// Put a validated order on its lane for the deduction workers.
    pub fn enqueue_order(&self, accepted: &AcceptedOrder) -> Result<Job, JobStoreError> {
        let payload = serde_json::to_value(accepted.task.to_payload())
            .map_err(|e| JobStoreError::Storage(format!("failed to encode task payload: {e}")))?;
        let job = Job::new(accepted.task.tenant_id, JobKind::DeductStock, accepted.lane.clone(), payload)
            .with_retry_policy(self.task_retry.clone());
        self.jobs.enqueue(job.clone())?;

        info!(
            task_id = %job.id,
            tenant_id = %accepted.task.tenant_id,
            order_id = %accepted.task.order_id,
            lane = %accepted.lane,
            "deduction task enqueued"
        );
        Ok(job)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn jobs(&self) -> &InMemoryJobStore {
        &self.jobs
    }

    pub fn intake(&self) -> &TaskIntake {
        &self.intake
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn sync_retry(&self) -> &RetryPolicy {
        &self.sync_retry
    }
}
