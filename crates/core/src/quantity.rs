//! Stock quantities.
//!
//! Quantities are exact decimals (`NUMERIC` in Postgres). Deductions never
//! round; whatever precision the caller supplies is preserved.

pub use rust_decimal::Decimal;

/// Quantity of a product (units, kilograms, ...). Always non-negative in the ledger.
pub type Quantity = Decimal;

/// `true` for strictly positive quantities.
pub fn is_positive(q: Quantity) -> bool {
    q > Decimal::ZERO
}
