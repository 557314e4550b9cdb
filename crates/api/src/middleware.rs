use std::time::Instant;

use axum::{
    extract::Query,
    http::{StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::info;

use stockflow_core::TenantId;

use crate::app::errors;
use crate::context::TenantContext;

#[derive(Debug, Deserialize)]
struct TenantQuery {
    tenant: Option<String>,
}

/// Resolve `?tenant=<id>` into a [`TenantContext`] extension.
pub async fn tenant_middleware(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let tenant_id = match tenant_from_uri(req.uri()) {
        Ok(tenant_id) => tenant_id,
        Err(message) => return errors::validation_error("tenant", message),
    };

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    next.run(req).await
}

fn tenant_from_uri(uri: &Uri) -> Result<TenantId, &'static str> {
    let Query(query) = Query::<TenantQuery>::try_from_uri(uri).map_err(|_| "invalid query string")?;
    let raw = query
        .tenant
        .filter(|t| !t.trim().is_empty())
        .ok_or("tenant query string is required")?;
    raw.parse::<TenantId>().map_err(|_| "invalid tenant id")
}

/// Log method, path, status and latency of every request.
pub async fn request_timing(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status: StatusCode = response.status();
    info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> Result<TenantId, &'static str> {
        tenant_from_uri(&uri.parse::<Uri>().unwrap())
    }

    #[test]
    fn tenant_is_read_from_query() {
        assert_eq!(parse("/orders-queue?tenant=7"), Ok(TenantId::new(7)));
        assert_eq!(parse("/orders/1?x=1&tenant=12"), Ok(TenantId::new(12)));
    }

    #[test]
    fn missing_or_invalid_tenant_is_rejected() {
        assert_eq!(parse("/orders-queue"), Err("tenant query string is required"));
        assert_eq!(parse("/orders-queue?tenant="), Err("tenant query string is required"));
        assert_eq!(parse("/orders-queue?tenant=abc"), Err("invalid tenant id"));
        assert_eq!(parse("/orders-queue?tenant=0"), Err("invalid tenant id"));
        assert_eq!(parse("/orders-queue?tenant=-3"), Err("invalid tenant id"));
    }
}
