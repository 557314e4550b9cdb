use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{
    Decimal, DomainError, DomainResult, ProductId, Quantity, StockId, TenantId, WarehouseId, is_positive,
};

/// Natural key of a stock row: one product in one warehouse for one tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
}

impl StockKey {
    pub fn new(tenant_id: TenantId, warehouse_id: WarehouseId, product_id: ProductId) -> Self {
        Self {
            tenant_id,
            warehouse_id,
            product_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "tenant={} warehouse={} product={}",
            self.tenant_id, self.warehouse_id, self.product_id
        )
    }
}

/// Stock rows are never deleted; they are soft-disabled instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Active,
    Disabled,
}

impl StockStatus {
    pub fn from_flag(active: bool) -> Self {
        if active { Self::Active } else { Self::Disabled }
    }
}

/// Balance record for one product in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub key: StockKey,
    pub quantity: Quantity,
    pub reserve: Quantity,
    pub on_hand: Quantity,
    pub minimum: Quantity,
    pub status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stock {
    /// A freshly created stock row. Unknown products start empty.
    pub fn empty(id: StockId, key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key,
            quantity: Decimal::ZERO,
            reserve: Decimal::ZERO,
            on_hand: Decimal::ZERO,
            minimum: Decimal::ZERO,
            status: StockStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Decide the effect of issuing `requested` units.
    ///
    /// `on_hand` tracks `quantity`. `reserve` is a separate hold counter that
    /// issues never draw from, so it is carried through unchanged.
    pub fn issue(&self, requested: Quantity) -> DomainResult<StockChange> {
        if !is_positive(requested) {
            return Err(DomainError::invariant("issued quantity must be positive"));
        }
        if self.quantity < requested {
            return Err(DomainError::InsufficientStock {
                product_id: self.key.product_id,
                available: self.quantity,
                requested,
            });
        }

        let new_quantity = self.quantity - requested;
        Ok(StockChange {
            quantity: Triplet::new(self.quantity, -requested),
            reserve: Triplet::unchanged(self.reserve),
            on_hand: Triplet::between(self.on_hand, new_quantity),
        })
    }

    /// Evolve the row with a previously decided change.
    pub fn apply(&mut self, change: &StockChange, now: DateTime<Utc>) {
        self.quantity = change.quantity.new;
        self.reserve = change.reserve.new;
        self.on_hand = change.on_hand.new;
        self.updated_at = now;
    }
}

/// `(old, change, new)` snapshot of one counter. Always `old + change == new`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triplet {
    pub old: Quantity,
    pub change: Quantity,
    pub new: Quantity,
}

impl Triplet {
    pub fn new(old: Quantity, change: Quantity) -> Self {
        Self {
            old,
            change,
            new: old + change,
        }
    }

    pub fn between(old: Quantity, new: Quantity) -> Self {
        Self {
            old,
            change: new - old,
            new,
        }
    }

    pub fn unchanged(value: Quantity) -> Self {
        Self::new(value, Decimal::ZERO)
    }
}

/// Triplets for all three stock counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub quantity: Triplet,
    pub reserve: Triplet,
    pub on_hand: Triplet,
}

/// Period-bucketed mirror of the stock balance (`stock_balance`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub stock_id: StockId,
    /// First day of the bucket's month.
    pub year_month: NaiveDate,
    pub balance: Quantity,
    pub reserve: Quantity,
}

/// First day of the month containing `at`, in UTC.
pub fn period_start(at: DateTime<Utc>) -> NaiveDate {
    let date = at.date_naive();
    date.with_day(1).unwrap_or(date)
}
