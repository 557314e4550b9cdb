//! Domain error model.

use thiserror::Error;

use crate::id::ProductId;
use crate::quantity::Quantity;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// balance rules, invariants). Infrastructure concerns (connections, conflicts
/// detected by the database) belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A request field failed validation. `field` names the first offending
    /// field using a JSON-path-like notation (`items[1].quantity`).
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// The aggregate stock counter cannot cover the requested quantity.
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        available: Quantity,
        requested: Quantity,
    },

    /// The open lots cannot cover the requested quantity, even though the stock
    /// counter could.
    #[error("insufficient lot quantity for product {product_id}: available {available}, requested {requested}")]
    InsufficientLotQuantity {
        product_id: ProductId,
        available: Quantity,
        requested: Quantity,
    },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Name of the offending field for validation failures.
    pub fn field(&self) -> Option<&str> {
        match self {
            DomainError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
