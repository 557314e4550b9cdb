use async_trait::async_trait;
use tracing::{error, info, warn};

use stockflow_events::{EventSink, OutcomeEvent, OutcomeStatus, SinkOutcome};

/// Writes outcome events to the process log. Always enabled unless turned off
/// in config.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppLogSink;

#[async_trait]
impl EventSink for AppLogSink {
    fn name(&self) -> &str {
        "app-log"
    }

    async fn record(&self, event: &OutcomeEvent) -> SinkOutcome {
        let items = event.items.len();
        let warehouse_id = event.warehouse_id.map(|w| w.get());
        let order_id = event.order_id.map(|o| o.get());
        let error = event.error.as_deref().unwrap_or_default();

        match event.status {
            OutcomeStatus::Success => info!(
                kind = event.kind.as_str(),
                tenant_id = %event.tenant_id,
                warehouse_id,
                order_id,
                task_id = ?event.task_id,
                items,
                "{}",
                event.message
            ),
            OutcomeStatus::Retrying => warn!(
                kind = event.kind.as_str(),
                tenant_id = %event.tenant_id,
                warehouse_id,
                order_id,
                task_id = ?event.task_id,
                attempt = event.attempt,
                error,
                "{}",
                event.message
            ),
            OutcomeStatus::Failed | OutcomeStatus::DeadLettered => error!(
                kind = event.kind.as_str(),
                status = ?event.status,
                tenant_id = %event.tenant_id,
                warehouse_id,
                order_id,
                task_id = ?event.task_id,
                attempt = event.attempt,
                error,
                "{}",
                event.message
            ),
        }
        SinkOutcome::Delivered { attempts: 1 }
    }
}
