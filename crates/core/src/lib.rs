//! `stockflow-core`: identifiers, quantities and the domain error model.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the quantity type and the domain error model.

pub mod error;
pub mod id;
pub mod quantity;

pub use error::{DomainError, DomainResult};
pub use id::{
    LotId, MovementId, OrderId, ProductId, StockId, TenantId, TransactionId, WarehouseId,
};
pub use quantity::{Decimal, Quantity, is_positive};
