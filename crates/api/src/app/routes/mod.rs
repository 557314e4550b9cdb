use axum::Router;

pub mod orders;
pub mod stock;
pub mod system;
pub mod tasks;

/// Router for all tenant-scoped (`?tenant=<id>`) endpoints.
pub fn tenant_router() -> Router {
    Router::new().merge(orders::router()).merge(tasks::router())
}
