//! Postgres-backed ledger store.
//!
//! Every unit of work is a `sqlx::Transaction` opened with
//! `SET TRANSACTION ISOLATION LEVEL SERIALIZABLE`. The transaction guard owns
//! its pooled connection; dropping it without `commit` rolls back and returns
//! the connection to the pool.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure) | `40001` | `Serialization` |
//! | Database (deadlock detected) | `40P01` | `Serialization` |
//! | Database (other) | Any other | `Persistence` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Connection` |
//! | Other | N/A | `Persistence` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};

use stockflow_core::{
    LotId, MovementId, OrderId, ProductId, Quantity, StockId, TenantId, TransactionId, WarehouseId,
};
use stockflow_inventory::{
    IdempotencyKey, Lot, NewStockMovement, NewTransaction, Order, Stock, StockKey, StockStatus,
};

use super::error::StoreError;
use super::store::{LedgerStore, LedgerTx, OrderReader};

const SCHEMA: &str = include_str!("../../migrations/0001_ledger.sql");

/// Postgres ledger store. Cheap to clone (the pool is reference counted).
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a pool with the given limits and wrap it.
    pub async fn connect(url: &str, max_connections: u32, acquire_timeout: Duration) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema. Statements are idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(PgLedgerTx { tx })
    }
}

#[async_trait]
impl OrderReader for PgLedgerStore {
    #[instrument(skip(self), fields(tenant_id = %tenant_id, order_id = %order_id), err)]
    async fn find_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, tenant_id, warehouse_id, order_number, stock_method,
                reserved, issued, canceled, returned,
                reserved_date, issued_date, canceled_date, returned_date,
                created_date, updated_date
            FROM "order"
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.get())
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?;

        row.map(|r| order_from_row(&r)).transpose()
    }
}

/// Unit of work over [`PgLedgerStore`].
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    #[instrument(skip(self), fields(key = %key), err)]
    async fn find_stock(&mut self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, warehouse_id, product_id, quantity, reserve, on_hand, minimum,
                   status, create_date, update_date
            FROM stock
            WHERE tenant_id = $1 AND warehouse_id = $2 AND product_id = $3
            FOR UPDATE
            "#,
        )
        .bind(key.tenant_id.get())
        .bind(key.warehouse_id.get())
        .bind(key.product_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_stock", e))?;

        row.map(|r| stock_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(key = %key), err)]
    async fn insert_stock(&mut self, key: &StockKey, now: DateTime<Utc>) -> Result<Stock, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock (
                tenant_id, warehouse_id, product_id,
                minimum, quantity, reserve, on_hand, status,
                create_date, update_date
            )
            VALUES ($1, $2, $3, 0, 0, 0, 0, TRUE, $4, $4)
            RETURNING id, tenant_id, warehouse_id, product_id, quantity, reserve, on_hand, minimum,
                      status, create_date, update_date
            "#,
        )
        .bind(key.tenant_id.get())
        .bind(key.warehouse_id.get())
        .bind(key.product_id.get())
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_stock", e))?;

        stock_from_row(&row)
    }

    #[instrument(skip(self, stock), fields(stock_id = %stock.id), err)]
    async fn update_stock(&mut self, stock: &Stock) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stock
            SET quantity = $1, reserve = $2, on_hand = $3, update_date = $4
            WHERE id = $5
            "#,
        )
        .bind(stock.quantity)
        .bind(stock.reserve)
        .bind(stock.on_hand)
        .bind(stock.updated_at)
        .bind(stock.id.get())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Persistence(format!("stock {} not found", stock.id)));
        }
        Ok(())
    }

    #[instrument(
        skip(self, key),
        fields(key = %key.key, order_id = %key.order_id, applied = tracing::field::Empty),
        err
    )]
    async fn transaction_exists(&mut self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM "transaction"
                WHERE model = $1 AND event = $2
                  AND tenant_id = $3 AND warehouse_id = $4 AND product_id = $5
                  AND quantity_change = $6 AND order_id = $7
            ) AS applied
            "#,
        )
        .bind(&key.model)
        .bind(&key.event)
        .bind(key.key.tenant_id.get())
        .bind(key.key.warehouse_id.get())
        .bind(key.key.product_id.get())
        .bind(key.quantity_change)
        .bind(key.order_id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("transaction_exists", e))?;

        let applied: bool = row
            .try_get("applied")
            .map_err(|e| StoreError::Persistence(format!("failed to read applied flag: {e}")))?;
        Span::current().record("applied", applied);
        Ok(applied)
    }

    #[instrument(skip(self, entry), fields(stock_id = %entry.stock_id, model = %entry.model), err)]
    async fn append_transaction(&mut self, entry: &NewTransaction) -> Result<TransactionId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO "transaction" (
                model, event, tenant_id, warehouse_id, product_id, stock_id,
                order_id, order_number,
                quantity_old, quantity_change, quantity_new,
                reserve_old, reserve_change, reserve_new,
                on_hand_old, on_hand_change, on_hand_new
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(&entry.model)
        .bind(&entry.event)
        .bind(entry.key.tenant_id.get())
        .bind(entry.key.warehouse_id.get())
        .bind(entry.key.product_id.get())
        .bind(entry.stock_id.get())
        .bind(entry.order_id.map(OrderId::get))
        .bind(entry.order_number.as_deref())
        .bind(entry.quantity.old)
        .bind(entry.quantity.change)
        .bind(entry.quantity.new)
        .bind(entry.reserve.old)
        .bind(entry.reserve.change)
        .bind(entry.reserve.new)
        .bind(entry.on_hand.old)
        .bind(entry.on_hand.change)
        .bind(entry.on_hand.new)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_transaction", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Persistence(format!("failed to read transaction id: {e}")))?;
        Ok(TransactionId::new(id))
    }

    #[instrument(skip(self), fields(stock_id = %stock_id), err)]
    async fn open_lots(&mut self, stock_id: StockId) -> Result<Vec<Lot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, stock_id, balance, cost_fifo, cost_average, created_date
            FROM lot
            WHERE stock_id = $1 AND balance > 0
            ORDER BY created_date ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(stock_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("open_lots", e))?;

        rows.iter().map(lot_from_row).collect()
    }

    #[instrument(skip(self), fields(lot_id = %lot_id), err)]
    async fn update_lot_balance(&mut self, lot_id: LotId, balance: Quantity) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE lot SET balance = $1 WHERE id = $2")
            .bind(balance)
            .bind(lot_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_lot_balance", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Persistence(format!("lot {lot_id} not found")));
        }
        Ok(())
    }

    #[instrument(skip(self, entry), fields(lot_id = %entry.lot_id), err)]
    async fn append_movement(&mut self, entry: &NewStockMovement) -> Result<MovementId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_movement (
                tenant_id, warehouse_id, product_id, stock_id, lot_id, model, action,
                balance_before, balance_change, balance_after,
                reserve_before, reserve_change, reserve_after,
                lot_balance_before, lot_balance_after,
                cost_fifo, cost_average
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING id
            "#,
        )
        .bind(entry.key.tenant_id.get())
        .bind(entry.key.warehouse_id.get())
        .bind(entry.key.product_id.get())
        .bind(entry.stock_id.get())
        .bind(entry.lot_id.get())
        .bind(&entry.model)
        .bind(&entry.action)
        .bind(entry.balance.old)
        .bind(entry.balance.change)
        .bind(entry.balance.new)
        .bind(entry.reserve.old)
        .bind(entry.reserve.change)
        .bind(entry.reserve.new)
        .bind(entry.lot_balance_before)
        .bind(entry.lot_balance_after)
        .bind(entry.cost_fifo)
        .bind(entry.cost_average)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::Persistence(format!("failed to read movement id: {e}")))?;
        Ok(MovementId::new(id))
    }

    #[instrument(skip(self), fields(stock_id = %stock_id, from = %from), err)]
    async fn apply_period_delta(
        &mut self,
        stock_id: StockId,
        delta: Quantity,
        from: NaiveDate,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE stock_balance
            SET balance = balance + $1
            WHERE stock_id = $2 AND year_month >= $3
            "#,
        )
        .bind(delta)
        .bind(stock_id.get())
        .bind(from)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("apply_period_delta", e))?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn read<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Persistence(format!("failed to read column {column}: {e}")))
}

fn stock_from_row(row: &PgRow) -> Result<Stock, StoreError> {
    Ok(Stock {
        id: StockId::new(read(row, "id")?),
        key: StockKey::new(
            TenantId::new(read(row, "tenant_id")?),
            WarehouseId::new(read(row, "warehouse_id")?),
            ProductId::new(read(row, "product_id")?),
        ),
        quantity: read(row, "quantity")?,
        reserve: read(row, "reserve")?,
        on_hand: read(row, "on_hand")?,
        minimum: read(row, "minimum")?,
        status: StockStatus::from_flag(read(row, "status")?),
        created_at: read(row, "create_date")?,
        updated_at: read(row, "update_date")?,
    })
}

fn lot_from_row(row: &PgRow) -> Result<Lot, StoreError> {
    Ok(Lot {
        id: LotId::new(read(row, "id")?),
        stock_id: StockId::new(read(row, "stock_id")?),
        balance: read(row, "balance")?,
        cost_fifo: read(row, "cost_fifo")?,
        cost_average: read(row, "cost_average")?,
        created_date: read(row, "created_date")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: OrderId::new(read(row, "id")?),
        tenant_id: TenantId::new(read(row, "tenant_id")?),
        warehouse_id: WarehouseId::new(read(row, "warehouse_id")?),
        order_number: read(row, "order_number")?,
        stock_method: read(row, "stock_method")?,
        reserved: read(row, "reserved")?,
        issued: read(row, "issued")?,
        canceled: read(row, "canceled")?,
        returned: read(row, "returned")?,
        reserved_date: read(row, "reserved_date")?,
        issued_date: read(row, "issued_date")?,
        canceled_date: read(row, "canceled_date")?,
        returned_date: read(row, "returned_date")?,
        created_at: read(row, "created_date")?,
        updated_at: read(row, "updated_date")?,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => StoreError::Serialization(msg),
                _ => StoreError::Persistence(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Connection(format!("timed out acquiring connection in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Connection(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Connection(format!("i/o error in {}: {}", operation, e)),
        sqlx::Error::Tls(e) => StoreError::Connection(format!("tls error in {}: {}", operation, e)),
        _ => StoreError::Persistence(format!("sqlx error in {}: {}", operation, err)),
    }
}
