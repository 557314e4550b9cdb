use thiserror::Error;

use stockflow_core::DomainError;

/// Storage-level failure, independent of the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backend aborted the transaction because a concurrent one
    /// committed a conflicting change (`40001`, `40P01`).
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Connectivity problem: pool timeout, closed pool, I/O.
    #[error("connection error: {0}")]
    Connection(String),

    /// Any other failure while reading or writing.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Serialization(_) | StoreError::Connection(_))
    }
}

/// Failure of a ledger operation.
///
/// - `Domain` is permanent: the same input will fail the same way.
/// - `Transient` is worth re-running as a brand-new attempt.
/// - `Persistence` is retried by the queue until its budget runs out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("transient database error: {0}")]
    Transient(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl LedgerError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, LedgerError::Domain(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transient(_))
    }

    /// Short machine-readable code used in API bodies and events.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Domain(DomainError::Validation { .. }) => "validation_error",
            LedgerError::Domain(DomainError::InsufficientStock { .. }) => "insufficient_stock",
            LedgerError::Domain(DomainError::InsufficientLotQuantity { .. }) => "insufficient_lot_quantity",
            LedgerError::Domain(DomainError::InvalidId(_)) => "invalid_id",
            LedgerError::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            LedgerError::Transient(_) => "transient_database_error",
            LedgerError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Serialization(msg) | StoreError::Connection(msg) => LedgerError::Transient(msg),
            StoreError::Persistence(msg) => LedgerError::Persistence(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::{Decimal, ProductId};

    #[test]
    fn store_errors_classify() {
        let e: LedgerError = StoreError::Serialization("40001".into()).into();
        assert!(e.is_transient());
        assert!(!e.is_permanent());

        let e: LedgerError = StoreError::Persistence("disk full".into()).into();
        assert!(!e.is_transient());
        assert!(!e.is_permanent());
    }

    #[test]
    fn business_failures_are_permanent() {
        let e: LedgerError = DomainError::InsufficientStock {
            product_id: ProductId::new(1),
            available: Decimal::ZERO,
            requested: Decimal::ONE,
        }
        .into();
        assert!(e.is_permanent());
        assert_eq!(e.code(), "insufficient_stock");
    }
}
