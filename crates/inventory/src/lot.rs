//! Inventory lots and FIFO allocation.
//!
//! A lot is a dated batch of inventory with its own remaining balance and cost
//! basis. Issues consume lots oldest-first. The allocator here is pure: it only
//! decides *which* lots give up *how much*; persisting the draws (and writing
//! one movement per draw) is the ledger engine's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{Decimal, DomainError, DomainResult, LotId, ProductId, Quantity, StockId};

/// A dated batch of inventory belonging to one stock row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub id: LotId,
    pub stock_id: StockId,
    pub balance: Quantity,
    pub cost_fifo: Decimal,
    pub cost_average: Decimal,
    pub created_date: DateTime<Utc>,
}

/// One lot's contribution to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotDraw {
    pub lot_id: LotId,
    pub balance_before: Quantity,
    pub taken: Quantity,
    pub balance_after: Quantity,
    pub cost_fifo: Decimal,
    pub cost_average: Decimal,
}

/// Plan a FIFO issue of `required` units from `lots`.
///
/// Lots with a zero balance are ignored; the rest are consumed in
/// `created_date` order (ties broken by lot id). Each draw takes
/// `min(remaining, lot.balance)`. The returned draws are in consumption order.
///
/// Fails with `InsufficientLotQuantity` when the open lots cannot cover the
/// request, regardless of what the stock counter says.
pub fn allocate_fifo(
    product_id: ProductId,
    lots: &[Lot],
    required: Quantity,
) -> DomainResult<Vec<LotDraw>> {
    if required <= Decimal::ZERO {
        return Err(DomainError::invariant("required quantity must be positive"));
    }

    let mut open: Vec<&Lot> = lots.iter().filter(|l| l.balance > Decimal::ZERO).collect();
    open.sort_by(|a, b| a.created_date.cmp(&b.created_date).then(a.id.cmp(&b.id)));

    let mut remaining = required;
    let mut draws = Vec::new();

    for lot in open {
        if remaining <= Decimal::ZERO {
            break;
        }
        let taken = remaining.min(lot.balance);
        draws.push(LotDraw {
            lot_id: lot.id,
            balance_before: lot.balance,
            taken,
            balance_after: lot.balance - taken,
            cost_fifo: lot.cost_fifo,
            cost_average: lot.cost_average,
        });
        remaining -= taken;
    }

    if remaining > Decimal::ZERO {
        return Err(DomainError::InsufficientLotQuantity {
            product_id,
            available: required - remaining,
            requested: required,
        });
    }

    Ok(draws)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn t(offset_days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset_days)
    }

    fn lot(id: i64, balance: i64, created: DateTime<Utc>) -> Lot {
        Lot {
            id: LotId::new(id),
            stock_id: StockId::new(1),
            balance: Decimal::from(balance),
            cost_fifo: Decimal::new(125, 2),
            cost_average: Decimal::new(110, 2),
            created_date: created,
        }
    }

    #[test]
    fn consumes_oldest_lot_first() {
        let lots = vec![lot(1, 5, t(0)), lot(2, 10, t(1))];
        let draws = allocate_fifo(ProductId::new(100), &lots, Decimal::from(7)).unwrap();

        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].lot_id, LotId::new(1));
        assert_eq!(draws[0].taken, Decimal::from(5));
        assert_eq!(draws[0].balance_after, Decimal::ZERO);
        assert_eq!(draws[1].lot_id, LotId::new(2));
        assert_eq!(draws[1].taken, Decimal::from(2));
        assert_eq!(draws[1].balance_after, Decimal::from(8));
    }

    #[test]
    fn ordering_uses_created_date_not_input_order() {
        let lots = vec![lot(2, 10, t(5)), lot(1, 5, t(0))];
        let draws = allocate_fifo(ProductId::new(100), &lots, Decimal::from(3)).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].lot_id, LotId::new(1));
    }

    #[test]
    fn empty_lots_are_skipped() {
        let lots = vec![lot(1, 0, t(0)), lot(2, 4, t(1))];
        let draws = allocate_fifo(ProductId::new(100), &lots, Decimal::from(4)).unwrap();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].lot_id, LotId::new(2));
    }

    #[test]
    fn shortfall_reports_available_total() {
        let lots = vec![lot(1, 2, t(0)), lot(2, 3, t(1))];
        let err = allocate_fifo(ProductId::new(9), &lots, Decimal::from(6)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientLotQuantity {
                product_id: ProductId::new(9),
                available: Decimal::from(5),
                requested: Decimal::from(6),
            }
        );
    }

    #[test]
    fn cost_snapshot_is_carried() {
        let lots = vec![lot(1, 2, t(0))];
        let draws = allocate_fifo(ProductId::new(1), &lots, Decimal::ONE).unwrap();
        assert_eq!(draws[0].cost_fifo, Decimal::new(125, 2));
        assert_eq!(draws[0].cost_average, Decimal::new(110, 2));
    }

    proptest! {
        #[test]
        fn draws_sum_to_required_and_never_overdraw(
            balances in proptest::collection::vec(0i64..50, 1..8),
            required in 1i64..200,
        ) {
            let lots: Vec<Lot> = balances
                .iter()
                .enumerate()
                .map(|(i, b)| lot(i as i64 + 1, *b, t(i as i64)))
                .collect();
            let total: i64 = balances.iter().sum();

            match allocate_fifo(ProductId::new(1), &lots, Decimal::from(required)) {
                Ok(draws) => {
                    prop_assert!(required <= total);
                    let taken: Decimal = draws.iter().map(|d| d.taken).sum();
                    prop_assert_eq!(taken, Decimal::from(required));
                    for d in &draws {
                        prop_assert!(d.balance_after >= Decimal::ZERO);
                        prop_assert!(d.taken > Decimal::ZERO);
                    }
                    // Only the last draw may leave a lot partially consumed.
                    for d in draws.iter().take(draws.len().saturating_sub(1)) {
                        prop_assert_eq!(d.balance_after, Decimal::ZERO);
                    }
                }
                Err(DomainError::InsufficientLotQuantity { available, .. }) => {
                    prop_assert!(required > total);
                    prop_assert_eq!(available, Decimal::from(total));
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
