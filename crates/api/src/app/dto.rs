use serde::Deserialize;
use serde_json::{Value, json};

use stockflow_infra::jobs::{DeadLetterEntry, Job, JobStatus};
use stockflow_infra::ledger::{DeductionReceipt, IssueReceipt};
use stockflow_inventory::{DeductionTask, StockIssue};

// -------------------------
// Request DTOs
// -------------------------

// Order and stock-issue bodies deserialize straight into
// `stockflow_inventory::{OrderRequest, StockIssueRequest}`.

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, 1000)
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn task_to_json(job: &Job) -> Value {
    let (state, error) = match &job.status {
        JobStatus::Pending => ("pending", None),
        JobStatus::Running => ("running", None),
        JobStatus::Completed => ("completed", None),
        JobStatus::Retrying { error, .. } => ("retrying", Some(error.as_str())),
        JobStatus::DeadLettered { error, .. } => ("dead_lettered", Some(error.as_str())),
    };
    json!({
        "task_id": job.id.to_string(),
        "tenant_id": job.tenant_id,
        "type": job.kind.type_name(),
        "queue": job.queue,
        "state": state,
        "error": error,
        "attempt": job.attempt,
        "max_attempts": job.retry_policy.max_attempts,
        "created_at": job.created_at.to_rfc3339(),
        "updated_at": job.updated_at.to_rfc3339(),
        "scheduled_at": job.scheduled_at.map(|t| t.to_rfc3339()),
        "payload": job.payload,
        "history": job.history,
    })
}

pub fn dead_letter_to_json(entry: &DeadLetterEntry) -> Value {
    json!({
        "task": task_to_json(&entry.job),
        "reason": entry.reason,
        "dead_lettered_at": entry.dead_lettered_at.to_rfc3339(),
    })
}

pub fn deduction_to_json(task: &DeductionTask, receipt: &DeductionReceipt) -> Value {
    let message = if receipt.applied.is_empty() {
        "stock already deducted"
    } else {
        "order created"
    };
    json!({
        "message": message,
        "tenant_id": task.tenant_id,
        "order_id": task.order_id,
        "order_number": task.order_number,
        "warehouse_id": task.warehouse_id,
        "applied": receipt.applied,
        "skipped": receipt.skipped,
    })
}

pub fn issue_to_json(issue: &StockIssue, receipt: &IssueReceipt) -> Value {
    let message = if receipt.already_applied {
        "stock already issued"
    } else {
        "stock issued successfully"
    };
    json!({
        "message": message,
        "tenant_id": issue.key.tenant_id,
        "warehouse_id": issue.key.warehouse_id,
        "product_id": issue.key.product_id,
        "stock_id": receipt.stock_id,
        "quantity": issue.quantity,
        "model": issue.model,
        "order_id": issue.order_id,
        "balance": receipt.balance,
        "lots": receipt.draws,
        "movements": receipt.movements,
        "period_buckets": receipt.period_buckets,
        "transaction_id": receipt.transaction_id,
        "already_applied": receipt.already_applied,
    })
}
