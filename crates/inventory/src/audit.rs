//! Audit record shapes: `transaction` and `stock_movement` rows.
//!
//! Both are append-only. A `Transaction` is written for every stock-level change
//! and doubles as the idempotency witness for deductions; a `StockMovement` is
//! written for every lot touched by a FIFO issue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{
    Decimal, LotId, MovementId, OrderId, Quantity, StockId, TransactionId,
};

use crate::lot::LotDraw;
use crate::stock::{StockChange, StockKey, Triplet};

/// Model tag for deductions driven by an order.
pub const MODEL_ORDER: &str = "ORDER";
/// Model tag used by the direct stock-issue path when the request names none.
pub const MODEL_ISSUE: &str = "ISSUE";
/// Event tag of every deduction.
pub const EVENT_ISSUE: &str = "ISSUE";
/// Action recorded on lot movements produced by an issue.
pub const ACTION_ISSUE: &str = "issue";

/// A transaction row about to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub model: String,
    pub event: String,
    pub key: StockKey,
    pub stock_id: StockId,
    pub order_id: Option<OrderId>,
    pub order_number: Option<String>,
    pub quantity: Triplet,
    pub reserve: Triplet,
    pub on_hand: Triplet,
}

impl NewTransaction {
    pub fn issue(
        model: impl Into<String>,
        key: StockKey,
        stock_id: StockId,
        change: &StockChange,
    ) -> Self {
        Self {
            model: model.into(),
            event: EVENT_ISSUE.to_string(),
            key,
            stock_id,
            order_id: None,
            order_number: None,
            quantity: change.quantity,
            reserve: change.reserve,
            on_hand: change.on_hand,
        }
    }

    pub fn for_order(mut self, order_id: Option<OrderId>, order_number: Option<String>) -> Self {
        self.order_id = order_id;
        self.order_number = order_number.filter(|n| !n.is_empty());
        self
    }
}

/// A persisted transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: NewTransaction,
}

/// A stock movement row about to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub key: StockKey,
    pub stock_id: StockId,
    pub lot_id: LotId,
    pub model: String,
    pub action: String,
    /// Stock-level running balance around this lot's draw.
    pub balance: Triplet,
    pub reserve: Triplet,
    pub lot_balance_before: Quantity,
    pub lot_balance_after: Quantity,
    pub cost_fifo: Decimal,
    pub cost_average: Decimal,
}

/// A persisted stock movement row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub entry: NewStockMovement,
}

/// Build one movement per lot draw, in draw order.
///
/// The stock-level balance runs down from `opening_balance` draw by draw, so the
/// last movement's `balance.new` equals the stock quantity after the issue.
pub fn movements_for_draws(
    key: StockKey,
    stock_id: StockId,
    model: &str,
    opening_balance: Quantity,
    reserve: Quantity,
    draws: &[LotDraw],
) -> Vec<NewStockMovement> {
    let mut running = opening_balance;
    draws
        .iter()
        .map(|draw| {
            let balance = Triplet::new(running, -draw.taken);
            running = balance.new;
            NewStockMovement {
                key,
                stock_id,
                lot_id: draw.lot_id,
                model: model.to_string(),
                action: ACTION_ISSUE.to_string(),
                balance,
                reserve: Triplet::unchanged(reserve),
                lot_balance_before: draw.balance_before,
                lot_balance_after: draw.balance_after,
                cost_fifo: draw.cost_fifo,
                cost_average: draw.cost_average,
            }
        })
        .collect()
}

/// Business key of an already-applied deduction.
///
/// A deduction is considered applied when a transaction exists with the same
/// model/event tags, stock key, quantity change and order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub model: String,
    pub event: String,
    pub key: StockKey,
    pub quantity_change: Quantity,
    pub order_id: OrderId,
}

impl IdempotencyKey {
    pub fn issue(model: impl Into<String>, key: StockKey, requested: Quantity, order_id: OrderId) -> Self {
        Self {
            model: model.into(),
            event: EVENT_ISSUE.to_string(),
            key,
            quantity_change: -requested,
            order_id,
        }
    }

    pub fn matches(&self, tx: &NewTransaction) -> bool {
        tx.model == self.model
            && tx.event == self.event
            && tx.key == self.key
            && tx.quantity.change == self.quantity_change
            && tx.order_id == Some(self.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::{ProductId, TenantId, WarehouseId};

    fn key() -> StockKey {
        StockKey::new(TenantId::new(1), WarehouseId::new(1), ProductId::new(100))
    }

    fn change(old: i64, requested: i64) -> StockChange {
        StockChange {
            quantity: Triplet::new(old.into(), Decimal::from(-requested)),
            reserve: Triplet::unchanged(Decimal::ZERO),
            on_hand: Triplet::new(old.into(), Decimal::from(-requested)),
        }
    }

    #[test]
    fn idempotency_key_matches_the_order_transaction() {
        let tx = NewTransaction::issue(MODEL_ORDER, key(), StockId::new(1), &change(20, 5))
            .for_order(Some(OrderId::new(77)), Some("SO-77".into()));

        let same = IdempotencyKey::issue(MODEL_ORDER, key(), Decimal::from(5), OrderId::new(77));
        assert!(same.matches(&tx));

        let other_order = IdempotencyKey::issue(MODEL_ORDER, key(), Decimal::from(5), OrderId::new(78));
        assert!(!other_order.matches(&tx));

        let other_qty = IdempotencyKey::issue(MODEL_ORDER, key(), Decimal::from(4), OrderId::new(77));
        assert!(!other_qty.matches(&tx));
    }

    #[test]
    fn empty_order_number_is_stored_as_none() {
        let tx = NewTransaction::issue(MODEL_ORDER, key(), StockId::new(1), &change(1, 1))
            .for_order(None, Some(String::new()));
        assert_eq!(tx.order_number, None);
    }

    #[test]
    fn movements_run_the_stock_balance_down() {
        let draws = vec![
            LotDraw {
                lot_id: LotId::new(1),
                balance_before: 5.into(),
                taken: 5.into(),
                balance_after: Decimal::ZERO,
                cost_fifo: Decimal::ONE,
                cost_average: Decimal::ONE,
            },
            LotDraw {
                lot_id: LotId::new(2),
                balance_before: 10.into(),
                taken: 2.into(),
                balance_after: 8.into(),
                cost_fifo: Decimal::TWO,
                cost_average: Decimal::TWO,
            },
        ];

        let moves = movements_for_draws(key(), StockId::new(1), MODEL_ISSUE, 15.into(), Decimal::ZERO, &draws);

        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].balance, Triplet::new(15.into(), Decimal::from(-5)));
        assert_eq!(moves[1].balance, Triplet::new(10.into(), Decimal::from(-2)));
        assert_eq!(moves[1].balance.new, Decimal::from(8));
        assert_eq!(moves[1].lot_balance_after, Decimal::from(8));
        assert!(moves.iter().all(|m| m.action == ACTION_ISSUE));
    }

    #[test]
    fn transaction_record_flattens_entry() {
        let record = TransactionRecord {
            id: TransactionId::new(9),
            recorded_at: Utc::now(),
            entry: NewTransaction::issue(MODEL_ORDER, key(), StockId::new(1), &change(20, 5)),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["model"], "ORDER");
        assert_eq!(json["event"], "ISSUE");
    }
}
