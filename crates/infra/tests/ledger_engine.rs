use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;

use stockflow_core::{Decimal, DomainError, OrderId, ProductId, TenantId, WarehouseId};
use stockflow_infra::jobs::RetryPolicy;
use stockflow_infra::ledger::{InMemoryLedgerStore, LedgerEngine, LedgerError, StoreError};
use stockflow_inventory::{
    DeductStockPayload, DeductionItem, DeductionTask, StockBalance, StockIssue, StockKey, TaskIntake, Triplet,
    period_start,
};

const TENANT: TenantId = TenantId::new(1);
const WAREHOUSE: WarehouseId = WarehouseId::new(10);

fn dec(n: i64) -> Decimal {
    Decimal::from(n)
}

fn key(product: i64) -> StockKey {
    StockKey::new(TENANT, WAREHOUSE, ProductId::new(product))
}

fn task(order: i64, items: &[(i64, i64)]) -> DeductionTask {
    DeductionTask {
        tenant_id: TENANT,
        warehouse_id: WAREHOUSE,
        order_id: OrderId::new(order),
        order_number: Some(format!("SO-{order}")),
        items: items
            .iter()
            .map(|(product, qty)| DeductionItem {
                product_id: ProductId::new(*product),
                quantity: dec(*qty),
            })
            .collect(),
    }
}

fn issue(product: i64, qty: i64, order: Option<i64>) -> StockIssue {
    StockIssue {
        key: key(product),
        quantity: dec(qty),
        model: "ISSUE".to_string(),
        order_id: order.map(OrderId::new),
    }
}

fn engine() -> (InMemoryLedgerStore, LedgerEngine<InMemoryLedgerStore>) {
    let store = InMemoryLedgerStore::new();
    (store.clone(), LedgerEngine::new(store))
}

fn quantity(store: &InMemoryLedgerStore, product: i64) -> Option<Decimal> {
    store.stock(&key(product)).map(|s| s.quantity)
}

#[tokio::test]
async fn deduction_records_full_triplets() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(20)).unwrap();

    let receipt = engine.deduct(&task(7, &[(100, 5)])).await.unwrap();

    assert_eq!(quantity(&store, 100), Some(dec(15)));
    assert_eq!(receipt.applied.len(), 1);
    assert_eq!(receipt.applied[0].quantity, Triplet::new(dec(20), dec(-5)));

    let transactions = store.transactions();
    assert_eq!(transactions.len(), 1);
    let entry = &transactions[0].entry;
    assert_eq!(entry.model, "ORDER");
    assert_eq!(entry.event, "ISSUE");
    assert_eq!(entry.order_id, Some(OrderId::new(7)));
    assert_eq!(entry.order_number.as_deref(), Some("SO-7"));
    assert_eq!((entry.quantity.old, entry.quantity.change, entry.quantity.new), (dec(20), dec(-5), dec(15)));
    assert_eq!(entry.on_hand, entry.quantity);
    assert_eq!(entry.reserve, Triplet::new(dec(0), dec(0)));
}

#[tokio::test]
async fn redelivered_task_is_applied_once() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(20)).unwrap();
    store.seed_stock(key(200), dec(8)).unwrap();
    let task = task(7, &[(100, 5), (200, 2)]);

    engine.deduct(&task).await.unwrap();
    let again = engine.deduct(&task).await.unwrap();

    assert!(again.applied.is_empty());
    assert_eq!(again.skipped, vec![ProductId::new(100), ProductId::new(200)]);
    assert_eq!(quantity(&store, 100), Some(dec(15)));
    assert_eq!(quantity(&store, 200), Some(dec(6)));
    assert_eq!(store.transactions().len(), 2);
}

#[tokio::test]
async fn same_quantity_for_a_different_order_is_applied() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(20)).unwrap();

    engine.deduct(&task(7, &[(100, 5)])).await.unwrap();
    engine.deduct(&task(8, &[(100, 5)])).await.unwrap();

    assert_eq!(quantity(&store, 100), Some(dec(10)));
}

#[tokio::test]
async fn insufficient_line_rolls_back_every_line() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(10)).unwrap();
    store.seed_stock(key(200), dec(1)).unwrap();

    let err = engine.deduct(&task(7, &[(100, 5), (200, 3)])).await.unwrap_err();

    assert_eq!(
        err,
        LedgerError::Domain(DomainError::InsufficientStock {
            product_id: ProductId::new(200),
            available: dec(1),
            requested: dec(3),
        })
    );
    assert!(err.is_permanent());
    assert_eq!(quantity(&store, 100), Some(dec(10)));
    assert_eq!(quantity(&store, 200), Some(dec(1)));
    assert!(store.transactions().is_empty());
}

#[tokio::test]
async fn unknown_product_fails_as_insufficient_stock() {
    let (store, engine) = engine();

    let err = engine.deduct(&task(7, &[(999, 1)])).await.unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Domain(DomainError::InsufficientStock { available, .. }) if available == dec(0)
    ));
    // The lazily created row rolled back with everything else
    assert!(store.stock(&key(999)).is_none());
}

#[tokio::test]
async fn fifo_issue_drains_oldest_lot_first() {
    let (store, engine) = engine();
    let stock = store.seed_stock(key(100), dec(15)).unwrap();
    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    // Seeded newest first so ordering comes from created_date
    let newer = store.seed_lot(stock.id, dec(10), dec(3), t1).unwrap();
    let older = store.seed_lot(stock.id, dec(5), dec(2), t0).unwrap();

    let receipt = engine.issue_lots(&issue(100, 7, None)).await.unwrap();

    assert_eq!(receipt.balance, dec(8));
    assert!(!receipt.already_applied);

    let lots = store.lots(stock.id);
    let balance_of = |id| lots.iter().find(|l| l.id == id).map(|l| l.balance);
    assert_eq!(balance_of(older.id), Some(dec(0)));
    assert_eq!(balance_of(newer.id), Some(dec(8)));

    let movements = store.movements();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].entry.lot_id, older.id);
    assert_eq!(movements[0].entry.balance, Triplet::new(dec(15), dec(-5)));
    assert_eq!(movements[0].entry.lot_balance_after, dec(0));
    assert_eq!(movements[1].entry.lot_id, newer.id);
    assert_eq!(movements[1].entry.balance, Triplet::new(dec(10), dec(-2)));
    assert_eq!(movements[1].entry.lot_balance_before, dec(10));
    assert!(movements.iter().all(|m| m.entry.action == "issue"));

    let transactions = store.transactions();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].entry.model, "ISSUE");
    assert_eq!(transactions[0].entry.quantity, Triplet::new(dec(15), dec(-7)));
}

#[tokio::test]
async fn fifo_issue_leaves_reserve_untouched() {
    let (store, engine) = engine();
    let stock = store.seed_stock(key(100), dec(15)).unwrap();
    store.seed_reserve(key(100), dec(4)).unwrap();
    store.seed_lot(stock.id, dec(5), dec(2), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()).unwrap();
    store.seed_lot(stock.id, dec(10), dec(3), Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()).unwrap();
    store
        .seed_period_balance(StockBalance {
            stock_id: stock.id,
            year_month: period_start(Utc::now()),
            balance: dec(15),
            reserve: dec(4),
        })
        .unwrap();

    engine.issue_lots(&issue(100, 7, None)).await.unwrap();

    let after = store.stock(&key(100)).unwrap();
    assert_eq!((after.quantity, after.reserve), (dec(8), dec(4)));

    let movements = store.movements();
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().all(|m| m.entry.reserve == Triplet::unchanged(dec(4))));
    assert_eq!(store.transactions()[0].entry.reserve, Triplet::unchanged(dec(4)));

    let bucket = &store.period_balances(stock.id)[0];
    assert_eq!((bucket.balance, bucket.reserve), (dec(8), dec(4)));
}

#[tokio::test]
async fn fifo_issue_needs_lot_cover_as_well_as_stock() {
    let (store, engine) = engine();
    let stock = store.seed_stock(key(100), dec(10)).unwrap();
    store
        .seed_lot(stock.id, dec(4), dec(1), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .unwrap();

    let err = engine.issue_lots(&issue(100, 6, None)).await.unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Domain(DomainError::InsufficientLotQuantity { available, requested, .. })
            if available == dec(4) && requested == dec(6)
    ));
    assert_eq!(quantity(&store, 100), Some(dec(10)));
    assert_eq!(store.lots(stock.id)[0].balance, dec(4));
    assert!(store.movements().is_empty());
}

#[tokio::test]
async fn fifo_issue_checks_stock_counter_first() {
    let (store, engine) = engine();
    let stock = store.seed_stock(key(100), dec(2)).unwrap();
    store.seed_lot(stock.id, dec(50), dec(1), Utc::now()).unwrap();

    let err = engine.issue_lots(&issue(100, 3, None)).await.unwrap_err();
    assert!(matches!(err, LedgerError::Domain(DomainError::InsufficientStock { .. })));
}

#[tokio::test]
async fn fifo_issue_with_order_is_idempotent() {
    let (store, engine) = engine();
    let stock = store.seed_stock(key(100), dec(10)).unwrap();
    store.seed_lot(stock.id, dec(10), dec(1), Utc::now()).unwrap();

    engine.issue_lots(&issue(100, 4, Some(55))).await.unwrap();
    let again = engine.issue_lots(&issue(100, 4, Some(55))).await.unwrap();

    assert!(again.already_applied);
    assert_eq!(again.balance, dec(6));
    assert_eq!(quantity(&store, 100), Some(dec(6)));
    assert_eq!(store.movements().len(), 1);
}

#[tokio::test]
async fn fifo_issue_updates_current_and_later_period_buckets() {
    let (store, engine) = engine();
    let stock = store.seed_stock(key(100), dec(10)).unwrap();
    store.seed_lot(stock.id, dec(10), dec(1), Utc::now()).unwrap();

    let current = period_start(Utc::now());
    let old = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
    for month in [old, current] {
        store
            .seed_period_balance(StockBalance {
                stock_id: stock.id,
                year_month: month,
                balance: dec(10),
                reserve: dec(0),
            })
            .unwrap();
    }

    let receipt = engine.issue_lots(&issue(100, 3, None)).await.unwrap();
    assert_eq!(receipt.period_buckets, 1);

    let buckets = store.period_balances(stock.id);
    let balance_for = |month| buckets.iter().find(|b| b.year_month == month).map(|b| b.balance);
    assert_eq!(balance_for(old), Some(dec(10)));
    assert_eq!(balance_for(current), Some(dec(7)));
}

#[tokio::test]
async fn serialization_failure_is_transient_and_rolls_back() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(20)).unwrap();
    store.fail_next_commits([StoreError::Serialization("could not serialize access".into())]);

    let err = engine.deduct(&task(7, &[(100, 5)])).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.code(), "transient_database_error");
    assert_eq!(quantity(&store, 100), Some(dec(20)));
    assert!(store.transactions().is_empty());
}

#[tokio::test]
async fn sync_retry_reruns_transient_failures() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(20)).unwrap();
    store.fail_next_commits([
        StoreError::Serialization("40001".into()),
        StoreError::Connection("pool timed out".into()),
    ]);

    let receipt = engine
        .deduct_with_retry(&task(7, &[(100, 5)]), &RetryPolicy::fixed(3, Duration::from_millis(1)))
        .await
        .unwrap();

    assert_eq!(receipt.applied.len(), 1);
    assert_eq!(quantity(&store, 100), Some(dec(15)));
    assert_eq!(store.transactions().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deductions_lose_no_updates() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(20)).unwrap();
    let engine = Arc::new(engine);
    let policy = RetryPolicy::fixed(100, Duration::from_millis(1));

    let handles: Vec<_> = (1..=20)
        .map(|order| {
            let engine = engine.clone();
            let policy = policy.clone();
            tokio::spawn(async move { engine.deduct_with_retry(&task(order, &[(100, 1)]), &policy).await })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(quantity(&store, 100), Some(dec(0)));
    assert_eq!(store.transactions().len(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overdraw_never_goes_negative() {
    let (store, engine) = engine();
    store.seed_stock(key(100), dec(5)).unwrap();
    let engine = Arc::new(engine);
    let policy = RetryPolicy::fixed(100, Duration::from_millis(1));

    let handles: Vec<_> = (1..=8)
        .map(|order| {
            let engine = engine.clone();
            let policy = policy.clone();
            tokio::spawn(async move { engine.deduct_with_retry(&task(order, &[(100, 1)]), &policy).await })
        })
        .collect();

    let mut applied = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(LedgerError::Domain(DomainError::InsufficientStock { .. })) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!((applied, insufficient), (5, 3));
    assert_eq!(quantity(&store, 100), Some(dec(0)));
}

#[test]
fn empty_items_are_rejected_before_the_engine() {
    let store = InMemoryLedgerStore::new();
    let payload = DeductStockPayload {
        tenant_id: TENANT,
        order_id: OrderId::new(7),
        order_number: "SO-7".to_string(),
        warehouse_id: WAREHOUSE,
        items: Vec::new(),
    };

    let err = TaskIntake::default().validate_payload(&payload).unwrap_err();
    assert_eq!(err.field(), Some("items"));
    assert!(store.transactions().is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn applied_quantities_sum_to_the_stock_decrease(
        initial in 0i64..200,
        requests in prop::collection::vec(1i64..40, 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (store, engine) = engine();
        store.seed_stock(key(100), dec(initial)).unwrap();

        let mut applied = Decimal::ZERO;
        for (i, qty) in requests.iter().enumerate() {
            let result = runtime.block_on(engine.deduct(&task(i as i64 + 1, &[(100, *qty)])));
            match result {
                Ok(_) => applied += dec(*qty),
                Err(err) => prop_assert!(err.is_permanent()),
            }
        }

        let remaining = quantity(&store, 100).unwrap();
        prop_assert!(remaining >= Decimal::ZERO);
        prop_assert_eq!(remaining, dec(initial) - applied);

        let logged: Decimal = store.transactions().iter().map(|t| t.entry.quantity.change).sum();
        prop_assert_eq!(logged, -applied);
    }
}
