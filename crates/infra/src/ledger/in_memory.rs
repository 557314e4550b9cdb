//! In-memory ledger store for tests/dev.
//!
//! Serializable isolation is modelled with optimistic validation: every stock
//! key a transaction reads is remembered together with the version it saw, and
//! `commit` fails with [`StoreError::Serialization`] if any of those keys was
//! changed by another committed transaction in the meantime (first committer
//! wins). Writes are buffered in the transaction and published atomically at
//! commit; dropping the transaction discards them.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use stockflow_core::{
    Decimal, LotId, MovementId, OrderId, Quantity, StockId, TenantId, TransactionId,
};
use stockflow_inventory::{
    IdempotencyKey, Lot, NewStockMovement, NewTransaction, Order, Stock, StockBalance, StockKey,
    StockMovement, TransactionRecord,
};

use super::error::StoreError;
use super::store::{LedgerStore, LedgerTx, OrderReader};

#[derive(Debug, Default)]
struct LedgerState {
    stocks: HashMap<StockKey, Stock>,
    stock_keys: HashMap<StockId, StockKey>,
    versions: HashMap<StockKey, u64>,
    lots: BTreeMap<LotId, Lot>,
    balances: BTreeMap<(StockId, NaiveDate), StockBalance>,
    transactions: Vec<TransactionRecord>,
    movements: Vec<StockMovement>,
    orders: HashMap<(TenantId, OrderId), Order>,
}

impl LedgerState {
    fn version(&self, key: &StockKey) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: StockKey) {
        *self.versions.entry(key).or_insert(0) += 1;
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LedgerState>,
    next_stock: AtomicI64,
    next_lot: AtomicI64,
    next_transaction: AtomicI64,
    next_movement: AtomicI64,
    commit_faults: Mutex<VecDeque<StoreError>>,
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Persistence("ledger state lock poisoned".to_string()))
    }

    fn next(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take_fault(&self) -> Option<StoreError> {
        self.commit_faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}

/// Shared, cloneable in-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a stock row with the given on-hand quantity.
    pub fn seed_stock(&self, key: StockKey, quantity: Quantity) -> Result<Stock, StoreError> {
        let mut state = self.shared.lock()?;
        let now = Utc::now();
        let stock = match state.stocks.get(&key) {
            Some(existing) => {
                let mut s = existing.clone();
                s.quantity = quantity;
                s.on_hand = quantity;
                s.updated_at = now;
                s
            }
            None => {
                let id = StockId::new(Shared::next(&self.shared.next_stock));
                let mut s = Stock::empty(id, key, now);
                s.quantity = quantity;
                s.on_hand = quantity;
                s
            }
        };
        state.stock_keys.insert(stock.id, key);
        state.stocks.insert(key, stock.clone());
        state.bump(key);
        Ok(stock)
    }

    /// Set the hold counter of an existing stock row.
    pub fn seed_reserve(&self, key: StockKey, reserve: Quantity) -> Result<Stock, StoreError> {
        let mut state = self.shared.lock()?;
        let stock = state
            .stocks
            .get_mut(&key)
            .ok_or_else(|| StoreError::Persistence(format!("unknown stock {key}")))?;
        stock.reserve = reserve;
        let stock = stock.clone();
        state.bump(key);
        Ok(stock)
    }

    /// Add a lot to an existing stock row.
    pub fn seed_lot(
        &self,
        stock_id: StockId,
        balance: Quantity,
        cost_fifo: Decimal,
        created_date: DateTime<Utc>,
    ) -> Result<Lot, StoreError> {
        let mut state = self.shared.lock()?;
        let key = *state
            .stock_keys
            .get(&stock_id)
            .ok_or_else(|| StoreError::Persistence(format!("unknown stock {stock_id}")))?;
        let lot = Lot {
            id: LotId::new(Shared::next(&self.shared.next_lot)),
            stock_id,
            balance,
            cost_fifo,
            cost_average: cost_fifo,
            created_date,
        };
        state.lots.insert(lot.id, lot.clone());
        state.bump(key);
        Ok(lot)
    }

    pub fn seed_period_balance(&self, balance: StockBalance) -> Result<(), StoreError> {
        let mut state = self.shared.lock()?;
        state.balances.insert((balance.stock_id, balance.year_month), balance);
        Ok(())
    }

    pub fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut state = self.shared.lock()?;
        state.orders.insert((order.tenant_id, order.id), order);
        Ok(())
    }

    /// Make the next `faults.len()` commits fail with the given errors.
    pub fn fail_next_commits(&self, faults: impl IntoIterator<Item = StoreError>) {
        self.shared
            .commit_faults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(faults);
    }

    pub fn stock(&self, key: &StockKey) -> Option<Stock> {
        self.shared.lock().ok()?.stocks.get(key).cloned()
    }

    pub fn lots(&self, stock_id: StockId) -> Vec<Lot> {
        self.shared
            .lock()
            .map(|s| s.lots.values().filter(|l| l.stock_id == stock_id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn period_balances(&self, stock_id: StockId) -> Vec<StockBalance> {
        self.shared
            .lock()
            .map(|s| {
                s.balances
                    .values()
                    .filter(|b| b.stock_id == stock_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.shared
            .lock()
            .map(|s| s.transactions.clone())
            .unwrap_or_default()
    }

    pub fn movements(&self) -> Vec<StockMovement> {
        self.shared
            .lock()
            .map(|s| s.movements.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(InMemoryLedgerTx {
            shared: self.shared.clone(),
            read_set: HashMap::new(),
            stocks: HashMap::new(),
            lot_balances: BTreeMap::new(),
            period_deltas: Vec::new(),
            transactions: Vec::new(),
            movements: Vec::new(),
        })
    }
}

#[async_trait]
impl OrderReader for InMemoryLedgerStore {
    async fn find_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.shared.lock()?.orders.get(&(tenant_id, order_id)).cloned())
    }
}

/// Unit of work over [`InMemoryLedgerStore`].
#[derive(Debug)]
pub struct InMemoryLedgerTx {
    shared: Arc<Shared>,
    /// Stock key -> version observed on first read.
    read_set: HashMap<StockKey, u64>,
    /// Stock rows read or written by this transaction (write buffer).
    stocks: HashMap<StockKey, (Stock, bool)>,
    lot_balances: BTreeMap<LotId, Quantity>,
    period_deltas: Vec<(StockId, Quantity, NaiveDate)>,
    transactions: Vec<TransactionRecord>,
    movements: Vec<StockMovement>,
}

impl InMemoryLedgerTx {
    fn observe(&mut self, state: &LedgerState, key: StockKey) {
        self.read_set.entry(key).or_insert_with(|| state.version(&key));
    }

    fn read_stock(&mut self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
        if let Some((stock, _)) = self.stocks.get(key) {
            return Ok(Some(stock.clone()));
        }
        let shared = self.shared.clone();
        let state = shared.lock()?;
        self.observe(&state, *key);
        let found = state.stocks.get(key).cloned();
        if let Some(stock) = &found {
            self.stocks.insert(*key, (stock.clone(), false));
        }
        Ok(found)
    }

    fn key_of(&self, stock_id: StockId) -> Option<StockKey> {
        self.stocks
            .iter()
            .find(|(_, (s, _))| s.id == stock_id)
            .map(|(k, _)| *k)
    }

    fn read_lots(&mut self, stock_id: StockId) -> Result<Vec<Lot>, StoreError> {
        let shared = self.shared.clone();
        let state = shared.lock()?;
        if let Some(key) = state.stock_keys.get(&stock_id).copied().or_else(|| self.key_of(stock_id)) {
            self.observe(&state, key);
        }
        let mut lots: Vec<Lot> = state
            .lots
            .values()
            .filter(|l| l.stock_id == stock_id)
            .cloned()
            .map(|mut l| {
                if let Some(balance) = self.lot_balances.get(&l.id) {
                    l.balance = *balance;
                }
                l
            })
            .filter(|l| l.balance > Decimal::ZERO)
            .collect();
        lots.sort_by(|a, b| a.created_date.cmp(&b.created_date).then(a.id.cmp(&b.id)));
        Ok(lots)
    }

    fn exists(&mut self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        if self.transactions.iter().any(|t| key.matches(&t.entry)) {
            return Ok(true);
        }
        let shared = self.shared.clone();
        let state = shared.lock()?;
        self.observe(&state, key.key);
        Ok(state.transactions.iter().any(|t| key.matches(&t.entry)))
    }

    fn publish(self) -> Result<(), StoreError> {
        let shared = self.shared.clone();
        let mut state = shared.lock()?;

        if let Some(fault) = shared.take_fault() {
            return Err(fault);
        }

        for (key, seen) in &self.read_set {
            if state.version(key) != *seen {
                return Err(StoreError::Serialization(format!(
                    "could not serialize access due to concurrent update ({key})"
                )));
            }
        }

        for (key, (stock, dirty)) in self.stocks {
            if !dirty {
                continue;
            }
            state.stock_keys.insert(stock.id, key);
            state.stocks.insert(key, stock);
            state.bump(key);
        }

        for (lot_id, balance) in self.lot_balances {
            if let Some(lot) = state.lots.get_mut(&lot_id) {
                lot.balance = balance;
            }
        }

        for (stock_id, delta, from) in self.period_deltas {
            for ((_, month), bucket) in state.balances.range_mut((stock_id, from)..) {
                if bucket.stock_id != stock_id || *month < from {
                    break;
                }
                bucket.balance += delta;
            }
        }

        state.transactions.extend(self.transactions);
        state.movements.extend(self.movements);
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn find_stock(&mut self, key: &StockKey) -> Result<Option<Stock>, StoreError> {
        self.read_stock(key)
    }

    async fn insert_stock(&mut self, key: &StockKey, now: DateTime<Utc>) -> Result<Stock, StoreError> {
        if let Some(existing) = self.read_stock(key)? {
            return Err(StoreError::Persistence(format!(
                "duplicate key: stock {} already exists for {key}",
                existing.id
            )));
        }
        let stock = Stock::empty(StockId::new(Shared::next(&self.shared.next_stock)), *key, now);
        self.stocks.insert(*key, (stock.clone(), true));
        Ok(stock)
    }

    async fn update_stock(&mut self, stock: &Stock) -> Result<(), StoreError> {
        if self.read_stock(&stock.key)?.is_none() {
            return Err(StoreError::Persistence(format!("stock {} not found", stock.id)));
        }
        self.stocks.insert(stock.key, (stock.clone(), true));
        Ok(())
    }

    async fn transaction_exists(&mut self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        self.exists(key)
    }

    async fn append_transaction(&mut self, entry: &NewTransaction) -> Result<TransactionId, StoreError> {
        let id = TransactionId::new(Shared::next(&self.shared.next_transaction));
        self.transactions.push(TransactionRecord {
            id,
            recorded_at: Utc::now(),
            entry: entry.clone(),
        });
        Ok(id)
    }

    async fn open_lots(&mut self, stock_id: StockId) -> Result<Vec<Lot>, StoreError> {
        self.read_lots(stock_id)
    }

    async fn update_lot_balance(&mut self, lot_id: LotId, balance: Quantity) -> Result<(), StoreError> {
        if balance < Decimal::ZERO {
            return Err(StoreError::Persistence(format!(
                "check constraint violated: lot {lot_id} balance {balance} < 0"
            )));
        }
        if !self.shared.lock()?.lots.contains_key(&lot_id) {
            return Err(StoreError::Persistence(format!("lot {lot_id} not found")));
        }
        self.lot_balances.insert(lot_id, balance);
        Ok(())
    }

    async fn append_movement(&mut self, entry: &NewStockMovement) -> Result<MovementId, StoreError> {
        let id = MovementId::new(Shared::next(&self.shared.next_movement));
        self.movements.push(StockMovement {
            id,
            recorded_at: Utc::now(),
            entry: entry.clone(),
        });
        Ok(id)
    }

    async fn apply_period_delta(
        &mut self,
        stock_id: StockId,
        delta: Quantity,
        from: NaiveDate,
    ) -> Result<u64, StoreError> {
        let touched = self
            .shared
            .lock()?
            .balances
            .keys()
            .filter(|(id, month)| *id == stock_id && *month >= from)
            .count() as u64;
        self.period_deltas.push((stock_id, delta, from));
        Ok(touched)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.publish()
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
