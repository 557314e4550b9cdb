use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockflow_core::{OrderId, ProductId, Quantity, TenantId, WarehouseId};

/// What produced the event. Sinks may route on this.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Outcome of an order deduction (queued or synchronous).
    Order,
    /// Outcome of a direct FIFO stock issue.
    StockIssue,
    Debug,
    Query,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Order => "order",
            EventKind::StockIssue => "stock_issue",
            EventKind::Debug => "debug",
            EventKind::Query => "query",
        }
    }
}

/// Result of one processing attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    /// Permanent failure reported to a synchronous caller.
    Failed,
    /// Attempt failed; the task will be redelivered.
    Retrying,
    /// Retry budget exhausted or permanent failure; task held for inspection.
    DeadLettered,
}

impl OutcomeStatus {
    pub fn level(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "info",
            OutcomeStatus::Retrying => "warn",
            OutcomeStatus::Failed | OutcomeStatus::DeadLettered => "error",
        }
    }
}

/// One line of the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// `true` when the idempotency check found the line already applied.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub already_applied: bool,
}

/// Structured outcome event emitted once per attempt.
///
/// Every optional field is populated by the producer; sinks never inspect the
/// original request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub event_id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub status: OutcomeStatus,
    pub level: String,
    pub tenant_id: TenantId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<WarehouseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<OutcomeItem>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeEvent {
    pub fn new(kind: EventKind, status: OutcomeStatus, tenant_id: TenantId, message: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            kind,
            status,
            level: status.level().to_string(),
            tenant_id,
            warehouse_id: None,
            order_id: None,
            order_number: None,
            task_id: None,
            attempt: None,
            items: Vec::new(),
            message: message.into(),
            error: None,
            dev_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_warehouse(mut self, warehouse_id: WarehouseId) -> Self {
        self.warehouse_id = Some(warehouse_id);
        self
    }

    pub fn with_order(mut self, order_id: OrderId, order_number: Option<String>) -> Self {
        self.order_id = Some(order_id);
        self.order_number = order_number;
        self
    }

    pub fn with_task(mut self, task_id: Uuid, attempt: u32) -> Self {
        self.task_id = Some(task_id);
        self.attempt = Some(attempt);
        self
    }

    pub fn with_items(mut self, items: Vec<OutcomeItem>) -> Self {
        self.items = items;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_dev_name(mut self, dev_name: Option<String>) -> Self {
        self.dev_name = dev_name.filter(|d| !d.is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::Decimal;

    #[test]
    fn serializes_with_type_tag_and_omits_empty_fields() {
        let event = OutcomeEvent::new(EventKind::Order, OutcomeStatus::Success, TenantId::new(1), "stock deducted")
            .with_warehouse(WarehouseId::new(2))
            .with_items(vec![OutcomeItem {
                product_id: ProductId::new(100),
                quantity: Decimal::from(5),
                already_applied: false,
            }]);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["status"], "success");
        assert_eq!(json["level"], "info");
        assert_eq!(json["warehouse_id"], 2);
        assert!(json.get("error").is_none());
        assert!(json.get("order_id").is_none());
        assert!(json["items"][0].get("already_applied").is_none());
    }

    #[test]
    fn status_drives_level() {
        let event = OutcomeEvent::new(EventKind::Order, OutcomeStatus::Retrying, TenantId::new(1), "retry");
        assert_eq!(event.level, "warn");
        assert_eq!(OutcomeStatus::DeadLettered.level(), "error");
    }
}
