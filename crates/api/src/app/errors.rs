use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockflow_core::DomainError;
use stockflow_infra::jobs::JobStoreError;
use stockflow_infra::ledger::LedgerError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation { field, message } => validation_error(field, message),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        e @ DomainError::InsufficientStock { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock", e.to_string())
        }
        e @ DomainError::InsufficientLotQuantity { .. } => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "insufficient_lot_quantity", e.to_string())
        }
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "invariant_violation", msg)
        }
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::Domain(e) => domain_error_to_response(e),
        e @ LedgerError::Transient(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, e.code(), e.to_string()),
        e @ LedgerError::Persistence(_) => json_error(StatusCode::INTERNAL_SERVER_ERROR, e.code(), e.to_string()),
    }
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        // A job owned by another tenant is indistinguishable from a missing one.
        JobStoreError::NotFound(_) | JobStoreError::TenantIsolation => {
            json_error(StatusCode::NOT_FOUND, "not_found", "task not found")
        }
        JobStoreError::AlreadyExists(id) => {
            json_error(StatusCode::CONFLICT, "conflict", format!("task {id} already exists"))
        }
        JobStoreError::Storage(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "queue_error", msg),
    }
}

pub fn body_rejection(rejection: JsonRejection) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
}

pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": message.into(),
            "field": field.into(),
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::{Decimal, ProductId};

    #[test]
    fn ledger_errors_map_to_statuses() {
        let insufficient = LedgerError::Domain(DomainError::InsufficientStock {
            product_id: ProductId::new(1),
            available: Decimal::ZERO,
            requested: Decimal::ONE,
        });
        assert_eq!(ledger_error_to_response(insufficient).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            ledger_error_to_response(LedgerError::Domain(DomainError::validation("items", "is required"))).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ledger_error_to_response(LedgerError::Transient("40001".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ledger_error_to_response(LedgerError::Persistence("disk full".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn foreign_tasks_look_missing() {
        assert_eq!(
            job_store_error_to_response(JobStoreError::TenantIsolation).status(),
            StatusCode::NOT_FOUND
        );
    }
}
