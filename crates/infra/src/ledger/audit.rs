//! Audit log writer.
//!
//! Appends `transaction` and `stock_movement` rows through the open ledger
//! transaction. Rows are never updated or deleted. A failed append is returned
//! to the engine, which rolls the whole transaction back.

use tracing::trace;

use stockflow_core::{MovementId, TransactionId};
use stockflow_inventory::{NewStockMovement, NewTransaction};

use super::error::StoreError;
use super::store::LedgerTx;

pub async fn record_transaction<T: LedgerTx>(
    tx: &mut T,
    entry: &NewTransaction,
) -> Result<TransactionId, StoreError> {
    let id = tx.append_transaction(entry).await?;
    trace!(
        transaction_id = %id,
        stock_id = %entry.stock_id,
        quantity_old = %entry.quantity.old,
        quantity_change = %entry.quantity.change,
        quantity_new = %entry.quantity.new,
        "transaction appended"
    );
    Ok(id)
}

/// Append movements in order. Returns their ids in the same order.
pub async fn record_movements<T: LedgerTx>(
    tx: &mut T,
    entries: &[NewStockMovement],
) -> Result<Vec<MovementId>, StoreError> {
    let mut ids = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = tx.append_movement(entry).await?;
        trace!(movement_id = %id, lot_id = %entry.lot_id, change = %entry.balance.change, "movement appended");
        ids.push(id);
    }
    Ok(ids)
}
