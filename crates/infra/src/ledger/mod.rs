//! Stock ledger: storage seam, transaction engine, idempotency guard and
//! audit writer.

pub mod audit;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod in_memory;
pub mod postgres;
pub mod retry;
pub mod store;

pub use engine::{AppliedItem, DeductionReceipt, IssueReceipt, LedgerEngine};
pub use error::{LedgerError, StoreError};
pub use in_memory::{InMemoryLedgerStore, InMemoryLedgerTx};
pub use postgres::{PgLedgerStore, PgLedgerTx};
pub use retry::retry_transient;
pub use store::{LedgerStore, LedgerTx, OrderReader};
