//! Outcome sinks: process log, webhook and search index.

pub mod app_log;
pub mod http;
pub mod search_index;
pub mod webhook;

use std::sync::Arc;

use tracing::info;

use stockflow_events::{EventKind, OutcomeEvent, OutcomeItem, OutcomeStatus, ReportSummary, Reporter};
use stockflow_inventory::DeductionTask;

use crate::config::SinkSettings;
use crate::ledger::DeductionReceipt;

pub use app_log::AppLogSink;
pub use http::DeliveryRetry;
pub use search_index::{SearchIndexConfig, SearchIndexSink};
pub use webhook::{AliasMap, WebhookConfig, WebhookSink};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink configuration error: {0}")]
    Config(String),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Report `event` on a detached task; the caller does not wait for sinks.
pub fn emit(reporter: &Reporter, event: OutcomeEvent) -> tokio::task::JoinHandle<ReportSummary> {
    let reporter = reporter.clone();
    tokio::spawn(async move { reporter.report(&event).await })
}

/// Order outcome for `task`, without items.
pub fn order_event(task: &DeductionTask, status: OutcomeStatus, message: &str) -> OutcomeEvent {
    OutcomeEvent::new(EventKind::Order, status, task.tenant_id, message)
        .with_warehouse(task.warehouse_id)
        .with_order(task.order_id, task.order_number.clone())
}

/// One item per requested line. Lines listed as skipped in `receipt` are
/// flagged as applied by an earlier delivery.
pub fn order_items(task: &DeductionTask, receipt: Option<&DeductionReceipt>) -> Vec<OutcomeItem> {
    task.items
        .iter()
        .map(|i| OutcomeItem {
            product_id: i.product_id,
            quantity: i.quantity,
            already_applied: receipt.is_some_and(|r| r.skipped.contains(&i.product_id)),
        })
        .collect()
}

/// Build a reporter holding every sink enabled in `settings`.
pub fn build_reporter(settings: &SinkSettings) -> Result<Reporter, SinkError> {
    let mut reporter = Reporter::new();

    if settings.app_log {
        reporter.add_sink(Arc::new(AppLogSink));
    }
    if let Some(url) = settings.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let config = WebhookConfig::new(url).with_pipeline(settings.webhook_pipeline.clone());
        reporter.add_sink(Arc::new(WebhookSink::new(config)?));
    }
    if let Some(url) = settings.search_url.as_deref().filter(|u| !u.trim().is_empty()) {
        let config = SearchIndexConfig::new(url, settings.search_index.clone())
            .with_credentials(settings.search_username.clone(), settings.search_password.clone());
        reporter.add_sink(Arc::new(SearchIndexSink::new(config)?));
    }

    info!(sinks = ?reporter.sink_names(), "outcome sinks configured");
    Ok(reporter)
}

#[cfg(test)]
mod tests {
    use stockflow_core::{Decimal, OrderId, ProductId, TenantId, WarehouseId};
    use stockflow_inventory::DeductionItem;

    use super::*;

    fn task() -> DeductionTask {
        DeductionTask {
            tenant_id: TenantId::new(1),
            warehouse_id: WarehouseId::new(2),
            order_id: OrderId::new(3),
            order_number: Some("SO-3".to_string()),
            items: [100, 101]
                .into_iter()
                .map(|p| DeductionItem {
                    product_id: ProductId::new(p),
                    quantity: Decimal::TWO,
                })
                .collect(),
        }
    }

    #[test]
    fn order_items_flag_skipped_lines() {
        let receipt = DeductionReceipt {
            applied: Vec::new(),
            skipped: vec![ProductId::new(101)],
        };

        let flags: Vec<_> = order_items(&task(), Some(&receipt)).iter().map(|i| i.already_applied).collect();
        assert_eq!(flags, [false, true]);
        assert!(order_items(&task(), None).iter().all(|i| !i.already_applied));
    }

    #[test]
    fn order_event_carries_order_identity() {
        let event = order_event(&task(), OutcomeStatus::Success, "stock deducted");
        assert_eq!(event.tenant_id, TenantId::new(1));
        assert_eq!(event.warehouse_id, Some(WarehouseId::new(2)));
        assert_eq!(event.order_id, Some(OrderId::new(3)));
        assert_eq!(event.order_number.as_deref(), Some("SO-3"));
    }

    #[test]
    fn default_settings_only_log() {
        let reporter = build_reporter(&SinkSettings::default()).unwrap();
        assert_eq!(reporter.sink_names(), ["app-log"]);
    }

    #[test]
    fn urls_enable_remote_sinks() {
        let settings = SinkSettings {
            webhook_url: Some("http://hooks:9200".to_string()),
            search_url: Some("http://search:9200".to_string()),
            ..SinkSettings::default()
        };
        let reporter = build_reporter(&settings).unwrap();
        assert_eq!(reporter.sink_names(), ["app-log", "webhook", "search-index"]);
    }
}
