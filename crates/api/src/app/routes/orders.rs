use std::sync::Arc;

use axum::{
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::warn;

use stockflow_core::OrderId;
use stockflow_events::OutcomeStatus;
use stockflow_infra::sinks::{emit, order_event, order_items};
use stockflow_inventory::OrderRequest;

use crate::app::{dto, errors, services::AppServices};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/orders-queue", post(enqueue_order))
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
}

/// POST /orders-queue - validate and enqueue a deduction task
pub async fn enqueue_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let accepted = match services.intake().accept_order(tenant.tenant_id(), &body) {
        Ok(accepted) => accepted,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let job = match services.enqueue_order(&accepted) {
        Ok(job) => job,
        Err(e) => return errors::job_store_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "message": "order enqueued for processing",
            "task_id": job.id.to_string(),
            "queue": job.queue,
        })),
    )
        .into_response()
}

/// POST /orders - deduct synchronously and return the receipt
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<OrderRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let task = match services.intake().accept_order(tenant.tenant_id(), &body) {
        Ok(accepted) => accepted.task,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger().deduct(&task, services.sync_retry()).await {
        Ok(receipt) => {
            emit(
                services.reporter(),
                order_event(&task, OutcomeStatus::Success, "stock deducted")
                    .with_items(order_items(&task, Some(&receipt))),
            );
            (StatusCode::CREATED, Json(dto::deduction_to_json(&task, &receipt))).into_response()
        }
        Err(e) => {
            warn!(tenant_id = %task.tenant_id, order_id = %task.order_id, error = %e, "synchronous deduction failed");
            emit(
                services.reporter(),
                order_event(&task, OutcomeStatus::Failed, "stock deduction failed")
                    .with_items(order_items(&task, None))
                    .with_error(e.to_string()),
            );
            errors::ledger_error_to_response(e)
        }
    }
}

/// GET /orders/:id - read an upstream order
pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"),
    };

    match services.ledger().find_order(tenant.tenant_id(), order_id).await {
        Ok(Some(order)) => (StatusCode::OK, Json(order)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

