//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger backend, job store, intake and reporter
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: query DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, Ledger};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    let tenant_scoped = routes::tenant_router().route_layer(axum::middleware::from_fn(middleware::tenant_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::stock::router())
        .merge(tenant_scoped)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_timing))
                .layer(Extension(services)),
        )
}
