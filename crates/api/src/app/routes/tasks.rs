//! Task inspection and dead-letter management.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use stockflow_infra::jobs::{JobId, JobStore};

use crate::app::{dto, errors, services::AppServices};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/tasks/:id", get(get_task))
        .route("/dead-letters", get(list_dead_letters))
        .route("/dead-letters/:id", axum::routing::delete(delete_dead_letter))
        .route("/dead-letters/:id/retry", post(retry_dead_letter))
        .route("/queue/stats", get(queue_stats))
}

fn parse_task_id(id: &str) -> Result<JobId, axum::response::Response> {
    id.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid task id"))
}

/// GET /tasks/:id
pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().get(tenant.tenant_id(), task_id) {
        Ok(Some(job)) => (StatusCode::OK, Json(dto::task_to_json(&job))).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "task not found"),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// GET /dead-letters
pub async fn list_dead_letters(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<dto::ListQuery>,
) -> axum::response::Response {
    match services.jobs().list_dead_letters(tenant.tenant_id(), query.limit()) {
        Ok(entries) => {
            let items: Vec<_> = entries.iter().map(dto::dead_letter_to_json).collect();
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "count": items.len(),
                    "items": items,
                })),
            )
                .into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// POST /dead-letters/:id/retry - requeue with a fresh budget
pub async fn retry_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().retry_dead_letter(tenant.tenant_id(), task_id) {
        Ok(job) => {
            info!(task_id = %task_id, tenant_id = %tenant.tenant_id(), "dead-lettered task requeued");
            (StatusCode::OK, Json(dto::task_to_json(&job))).into_response()
        }
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// DELETE /dead-letters/:id
pub async fn delete_dead_letter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let task_id = match parse_task_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services.jobs().delete_dead_letter(tenant.tenant_id(), task_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}

/// GET /queue/stats
pub async fn queue_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.jobs().stats(tenant.tenant_id()) {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => errors::job_store_error_to_response(e),
    }
}
