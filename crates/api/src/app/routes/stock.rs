use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tracing::warn;

use stockflow_events::{EventKind, OutcomeEvent, OutcomeItem, OutcomeStatus};
use stockflow_infra::sinks::emit;
use stockflow_inventory::{StockIssue, StockIssueRequest};

use crate::app::{dto, errors, services::AppServices};

/// Stock-issue carries its tenant in the body, so it sits outside the
/// tenant-query middleware.
pub fn router() -> Router {
    Router::new().route("/stock-issue", post(issue_stock))
}

/// POST /stock-issue - FIFO issue of one product
pub async fn issue_stock(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<StockIssueRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::body_rejection(rejection),
    };

    let issue = match services.intake().validate_issue(&body) {
        Ok(issue) => issue,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger().issue(&issue, services.sync_retry()).await {
        Ok(receipt) => {
            emit(
                services.reporter(),
                issue_event(&issue, OutcomeStatus::Success, "stock issued", receipt.already_applied),
            );
            (StatusCode::OK, Json(dto::issue_to_json(&issue, &receipt))).into_response()
        }
        Err(e) => {
            warn!(key = %issue.key, error = %e, "stock issue failed");
            emit(
                services.reporter(),
                issue_event(&issue, OutcomeStatus::Failed, "stock issue failed", false).with_error(e.to_string()),
            );
            errors::ledger_error_to_response(e)
        }
    }
}

fn issue_event(issue: &StockIssue, status: OutcomeStatus, message: &str, already_applied: bool) -> OutcomeEvent {
    let event = OutcomeEvent::new(EventKind::StockIssue, status, issue.key.tenant_id, message)
        .with_warehouse(issue.key.warehouse_id)
        .with_items(vec![OutcomeItem {
            product_id: issue.key.product_id,
            quantity: issue.quantity,
            already_applied,
        }]);
    match issue.order_id {
        Some(order_id) => event.with_order(order_id, None),
        None => event,
    }
}
