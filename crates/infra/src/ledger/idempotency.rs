//! Idempotency guard.
//!
//! A deduction is already applied when its witness transaction row is
//! visible inside the *same* transaction that would apply it. Two concurrent
//! attempts for the same order both read the row set; the store's Serializable
//! guarantee lets at most one of them insert.

use tracing::debug;

use stockflow_core::{OrderId, Quantity};
use stockflow_inventory::{IdempotencyKey, StockKey};

use super::error::StoreError;
use super::store::LedgerTx;

/// Witness key for issuing `requested` units of `key` for `order_id`.
pub fn witness(model: &str, key: StockKey, requested: Quantity, order_id: OrderId) -> IdempotencyKey {
    IdempotencyKey::issue(model, key, requested, order_id)
}

pub async fn already_applied<T: LedgerTx>(tx: &mut T, key: &IdempotencyKey) -> Result<bool, StoreError> {
    let applied = tx.transaction_exists(key).await?;
    if applied {
        debug!(
            key = %key.key,
            order_id = %key.order_id,
            quantity_change = %key.quantity_change,
            "deduction already applied; skipping"
        );
    }
    Ok(applied)
}
