//! Queue handler for `order:deduct_stock` tasks.
//!
//! Decodes and validates the payload, runs the ledger deduction and reports
//! one outcome event per attempt:
//!
//! - success, including redeliveries whose lines were already applied
//! - permanent failure (bad payload, insufficient stock): dead-lettered at once
//! - transient or persistence failure: redelivered until the budget runs out

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use stockflow_core::TenantId;
use stockflow_events::{EventKind, OutcomeEvent, OutcomeStatus, Reporter};
use stockflow_inventory::{DeductStockPayload, DeductionTask, TaskIntake};

use crate::jobs::{Job, JobHandler, JobResult};
use crate::ledger::{LedgerEngine, LedgerStore};
use crate::sinks::{emit, order_event, order_items};

pub struct DeductStockWorker<S> {
    engine: Arc<LedgerEngine<S>>,
    intake: TaskIntake,
    reporter: Reporter,
}

impl<S> DeductStockWorker<S> {
    pub fn new(engine: Arc<LedgerEngine<S>>, intake: TaskIntake, reporter: Reporter) -> Self {
        Self {
            engine,
            intake,
            reporter,
        }
    }
}

fn task_event(job: &Job, task: &DeductionTask, status: OutcomeStatus, message: &str) -> OutcomeEvent {
    order_event(task, status, message).with_task(job.id.as_uuid(), job.attempt)
}

/// `Retrying` while the job has budget left for another run.
fn failure_status(job: &Job) -> OutcomeStatus {
    if job.has_retries_left() {
        OutcomeStatus::Retrying
    } else {
        OutcomeStatus::DeadLettered
    }
}

impl<S> DeductStockWorker<S> {
    fn reject(&self, job: &Job, tenant_id: TenantId, error: String) -> JobResult {
        warn!(job_id = %job.id, tenant_id = %tenant_id, error = %error, "rejecting undeliverable task");
        emit(
            &self.reporter,
            OutcomeEvent::new(EventKind::Order, OutcomeStatus::DeadLettered, tenant_id, "task rejected")
                .with_task(job.id.as_uuid(), job.attempt)
                .with_error(error.clone()),
        );
        JobResult::Fatal(error)
    }
}

#[async_trait]
impl<S: LedgerStore + 'static> JobHandler for DeductStockWorker<S> {
    async fn handle(&self, job: &Job) -> JobResult {
        let payload: DeductStockPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => return self.reject(job, job.tenant_id, format!("malformed payload: {err}")),
        };
        let task = match self.intake.validate_payload(&payload) {
            Ok(task) => task,
            Err(err) => return self.reject(job, job.tenant_id, err.to_string()),
        };

        match self.engine.deduct(&task).await {
            Ok(receipt) => {
                info!(
                    job_id = %job.id,
                    tenant_id = %task.tenant_id,
                    order_id = %task.order_id,
                    applied = receipt.applied.len(),
                    skipped = receipt.skipped.len(),
                    "deduct_stock task done"
                );
                let message = if receipt.applied.is_empty() {
                    "stock already deducted"
                } else {
                    "stock deducted"
                };
                emit(
                    &self.reporter,
                    task_event(job, &task, OutcomeStatus::Success, message).with_items(order_items(&task, Some(&receipt))),
                );
                JobResult::Success
            }
            Err(err) if err.is_permanent() => {
                emit(
                    &self.reporter,
                    task_event(job, &task, OutcomeStatus::DeadLettered, "stock deduction failed")
                        .with_items(order_items(&task, None))
                        .with_error(err.to_string()),
                );
                JobResult::Fatal(err.to_string())
            }
            Err(err) => {
                emit(
                    &self.reporter,
                    task_event(job, &task, failure_status(job), "stock deduction attempt failed")
                        .with_items(order_items(&task, None))
                        .with_error(err.to_string()),
                );
                JobResult::Failure(err.to_string())
            }
        }
    }

    async fn timed_out(&self, job: &Job, after: Duration) {
        let Some(task) = serde_json::from_value::<DeductStockPayload>(job.payload.clone())
            .ok()
            .and_then(|payload| self.intake.validate_payload(&payload).ok())
        else {
            return;
        };
        emit(
            &self.reporter,
            task_event(job, &task, failure_status(job), "stock deduction timed out")
                .with_items(order_items(&task, None))
                .with_error(format!("timed out after {}ms", after.as_millis())),
        );
    }
}
