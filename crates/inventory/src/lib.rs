//! Inventory ledger domain.
//!
//! This crate contains the business rules of the stock ledger, implemented as
//! deterministic domain logic (no IO, no HTTP, no storage): stock counters,
//! FIFO lot allocation, audit record shapes and request validation.

pub mod audit;
pub mod lot;
pub mod order;
pub mod stock;
pub mod task;

pub use audit::{
    ACTION_ISSUE, EVENT_ISSUE, IdempotencyKey, MODEL_ISSUE, MODEL_ORDER, NewStockMovement,
    NewTransaction, StockMovement, TransactionRecord, movements_for_draws,
};
pub use lot::{Lot, LotDraw, allocate_fifo};
pub use order::Order;
pub use stock::{Stock, StockBalance, StockChange, StockKey, StockStatus, Triplet, period_start};
pub use task::{
    AcceptedOrder, DeductStockPayload, DeductionItem, DeductionTask, OrderItem, OrderRequest,
    StockIssue, StockIssueRequest, TASK_DEDUCT_STOCK, TaskIntake,
};
