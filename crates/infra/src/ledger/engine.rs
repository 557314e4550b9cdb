//! Stock ledger transaction engine.
//!
//! Both entry points run one store transaction end to end:
//!
//! - [`LedgerEngine::deduct`] applies every line of a [`DeductionTask`] or
//!   none of them. Lines whose witness transaction already exists are skipped.
//! - [`LedgerEngine::issue_lots`] issues one product against its stock counter
//!   *and* its FIFO lots; both checks must pass.
//!
//! Missing stock rows are created empty, so an unknown product always fails
//! with `InsufficientStock` instead of a lookup error.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Span, debug, info, instrument, warn};

use stockflow_core::{MovementId, ProductId, Quantity, StockId, TransactionId};
use stockflow_inventory::{
    DeductionTask, LotDraw, MODEL_ORDER, NewTransaction, Stock, StockIssue, StockKey, Triplet,
    allocate_fifo, movements_for_draws, period_start,
};

use super::audit;
use super::error::{LedgerError, StoreError};
use super::idempotency;
use super::retry::retry_transient;
use super::store::{LedgerStore, LedgerTx};
use crate::jobs::RetryPolicy;

/// One line applied by [`LedgerEngine::deduct`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedItem {
    pub product_id: ProductId,
    pub stock_id: StockId,
    pub transaction_id: TransactionId,
    pub quantity: Triplet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeductionReceipt {
    pub applied: Vec<AppliedItem>,
    /// Lines found already applied by an earlier delivery.
    pub skipped: Vec<ProductId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReceipt {
    pub stock_id: StockId,
    pub key: StockKey,
    /// Stock quantity after the issue.
    pub balance: Quantity,
    pub transaction_id: Option<TransactionId>,
    pub draws: Vec<LotDraw>,
    pub movements: Vec<MovementId>,
    pub period_buckets: u64,
    pub already_applied: bool,
}

/// Orchestrates guard, allocator and audit writer inside one transaction.
#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(
        skip(self, task),
        fields(
            tenant_id = %task.tenant_id,
            warehouse_id = %task.warehouse_id,
            order_id = %task.order_id,
            items = task.items.len(),
            applied = tracing::field::Empty,
            skipped = tracing::field::Empty
        ),
        err
    )]
    pub async fn deduct(&self, task: &DeductionTask) -> Result<DeductionReceipt, LedgerError> {
        let mut tx = self.store.begin().await?;

        let receipt = match deduct_in(&mut tx, task, Utc::now()).await {
            Ok(receipt) => receipt,
            Err(err) => {
                abort(tx).await;
                return Err(err);
            }
        };
        tx.commit().await?;

        let span = Span::current();
        span.record("applied", receipt.applied.len());
        span.record("skipped", receipt.skipped.len());
        info!(
            tenant_id = %task.tenant_id,
            order_id = %task.order_id,
            applied = receipt.applied.len(),
            skipped = receipt.skipped.len(),
            "deduction committed"
        );
        Ok(receipt)
    }

    #[instrument(
        skip(self, issue),
        fields(key = %issue.key, quantity = %issue.quantity, model = %issue.model),
        err
    )]
    pub async fn issue_lots(&self, issue: &StockIssue) -> Result<IssueReceipt, LedgerError> {
        let mut tx = self.store.begin().await?;

        let receipt = match issue_in(&mut tx, issue, Utc::now()).await {
            Ok(receipt) => receipt,
            Err(err) => {
                abort(tx).await;
                return Err(err);
            }
        };
        tx.commit().await?;

        info!(
            key = %issue.key,
            balance = %receipt.balance,
            lots = receipt.draws.len(),
            already_applied = receipt.already_applied,
            "stock issue committed"
        );
        Ok(receipt)
    }

    /// [`Self::deduct`], re-run from scratch on transient failures.
    pub async fn deduct_with_retry(
        &self,
        task: &DeductionTask,
        policy: &RetryPolicy,
    ) -> Result<DeductionReceipt, LedgerError> {
        retry_transient(policy, |_| self.deduct(task)).await
    }

    /// [`Self::issue_lots`], re-run from scratch on transient failures.
    pub async fn issue_with_retry(&self, issue: &StockIssue, policy: &RetryPolicy) -> Result<IssueReceipt, LedgerError> {
        retry_transient(policy, |_| self.issue_lots(issue)).await
    }
}

async fn abort<T: LedgerTx>(tx: T) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}

async fn load_or_create<T: LedgerTx>(tx: &mut T, key: &StockKey, now: DateTime<Utc>) -> Result<Stock, StoreError> {
    match tx.find_stock(key).await? {
        Some(stock) => Ok(stock),
        None => {
            debug!(key = %key, "stock row missing; creating empty");
            tx.insert_stock(key, now).await
        }
    }
}

async fn deduct_in<T: LedgerTx>(
    tx: &mut T,
    task: &DeductionTask,
    now: DateTime<Utc>,
) -> Result<DeductionReceipt, LedgerError> {
    let mut receipt = DeductionReceipt::default();

    for item in &task.items {
        let key = task.key_for(item);
        let mut stock = load_or_create(tx, &key, now).await?;

        let witness = idempotency::witness(MODEL_ORDER, key, item.quantity, task.order_id);
        if idempotency::already_applied(tx, &witness).await? {
            receipt.skipped.push(item.product_id);
            continue;
        }

        let change = stock.issue(item.quantity)?;
        stock.apply(&change, now);
        tx.update_stock(&stock).await?;

        let entry = NewTransaction::issue(MODEL_ORDER, key, stock.id, &change)
            .for_order(Some(task.order_id), task.order_number.clone());
        let transaction_id = audit::record_transaction(tx, &entry).await?;

        receipt.applied.push(AppliedItem {
            product_id: item.product_id,
            stock_id: stock.id,
            transaction_id,
            quantity: change.quantity,
        });
    }

    Ok(receipt)
}

async fn issue_in<T: LedgerTx>(
    tx: &mut T,
    issue: &StockIssue,
    now: DateTime<Utc>,
) -> Result<IssueReceipt, LedgerError> {
    let mut stock = load_or_create(tx, &issue.key, now).await?;

    if let Some(order_id) = issue.order_id {
        let witness = idempotency::witness(&issue.model, issue.key, issue.quantity, order_id);
        if idempotency::already_applied(tx, &witness).await? {
            return Ok(IssueReceipt {
                stock_id: stock.id,
                key: issue.key,
                balance: stock.quantity,
                transaction_id: None,
                draws: Vec::new(),
                movements: Vec::new(),
                period_buckets: 0,
                already_applied: true,
            });
        }
    }

    let change = stock.issue(issue.quantity)?;
    stock.apply(&change, now);
    tx.update_stock(&stock).await?;
    let period_buckets = tx
        .apply_period_delta(stock.id, change.quantity.change, period_start(now))
        .await?;

    let lots = tx.open_lots(stock.id).await?;
    let draws = allocate_fifo(issue.key.product_id, &lots, issue.quantity)?;
    for draw in &draws {
        tx.update_lot_balance(draw.lot_id, draw.balance_after).await?;
    }

    let movements = movements_for_draws(
        issue.key,
        stock.id,
        &issue.model,
        change.quantity.old,
        change.reserve.old,
        &draws,
    );
    let movement_ids = audit::record_movements(tx, &movements).await?;

    let entry = NewTransaction::issue(issue.model.clone(), issue.key, stock.id, &change).for_order(issue.order_id, None);
    let transaction_id = audit::record_transaction(tx, &entry).await?;

    Ok(IssueReceipt {
        stock_id: stock.id,
        key: issue.key,
        balance: change.quantity.new,
        transaction_id: Some(transaction_id),
        draws,
        movements: movement_ids,
        period_buckets,
        already_applied: false,
    })
}
