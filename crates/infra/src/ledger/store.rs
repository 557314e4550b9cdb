//! Storage seam of the ledger.
//!
//! A [`LedgerStore`] opens [`LedgerTx`] units of work. Every implementation
//! must give the guarantees of Serializable isolation: if two transactions
//! touch the same stock row, at most one of them commits and the other fails
//! with [`StoreError::Serialization`]. Dropping a `LedgerTx` without calling
//! [`LedgerTx::commit`] must leave no trace.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use stockflow_core::{LotId, MovementId, OrderId, Quantity, StockId, TenantId, TransactionId};
use stockflow_inventory::{
    IdempotencyKey, Lot, NewStockMovement, NewTransaction, Order, Stock, StockKey,
};

use super::error::StoreError;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    /// Open a transaction at Serializable isolation.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

#[async_trait]
pub trait LedgerTx: Send {
    async fn find_stock(&mut self, key: &StockKey) -> Result<Option<Stock>, StoreError>;

    /// Insert an empty stock row for `key`.
    async fn insert_stock(&mut self, key: &StockKey, now: DateTime<Utc>) -> Result<Stock, StoreError>;

    async fn update_stock(&mut self, stock: &Stock) -> Result<(), StoreError>;

    /// `true` when a transaction row matching `key` is visible.
    async fn transaction_exists(&mut self, key: &IdempotencyKey) -> Result<bool, StoreError>;

    async fn append_transaction(&mut self, entry: &NewTransaction) -> Result<TransactionId, StoreError>;

    /// Lots of `stock_id` with a positive balance, oldest first.
    async fn open_lots(&mut self, stock_id: StockId) -> Result<Vec<Lot>, StoreError>;

    async fn update_lot_balance(&mut self, lot_id: LotId, balance: Quantity) -> Result<(), StoreError>;

    async fn append_movement(&mut self, entry: &NewStockMovement) -> Result<MovementId, StoreError>;

    /// Add `delta` to every `stock_balance` bucket of `stock_id` at or after
    /// `from`. Returns the number of buckets touched.
    async fn apply_period_delta(
        &mut self,
        stock_id: StockId,
        delta: Quantity,
        from: NaiveDate,
    ) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Read access to upstream orders.
#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn find_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError>;
}
