//! Task intake: wire shapes for inbound deduction requests and the validator
//! that turns them into canonical tasks.
//!
//! Validation reports the *first* offending field, using JSON-path-like names
//! (`warehouse_id`, `items[2].quantity`). Nothing here touches storage; the
//! ledger engine only ever sees [`DeductionTask`] / [`StockIssue`] values that
//! passed through [`TaskIntake`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stockflow_core::{DomainError, DomainResult, OrderId, ProductId, Quantity, TenantId, WarehouseId, is_positive};

use crate::audit::MODEL_ISSUE;
use crate::stock::StockKey;

/// Queue task name for order deductions.
pub const TASK_DEDUCT_STOCK: &str = "order:deduct_stock";

/// One requested line as it arrives on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Queue payload of an `order:deduct_stock` task.
///
/// Missing fields decode to their zero value so validation can name them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeductStockPayload {
    pub tenant_id: TenantId,
    pub order_id: OrderId,
    pub order_number: String,
    pub warehouse_id: WarehouseId,
    pub items: Vec<OrderItem>,
}

/// HTTP body of an order submission. The tenant comes from the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRequest {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub order_number: String,
    pub items: Vec<OrderItem>,
    /// Requested priority lane; absent means the default lane.
    pub priority: Option<String>,
}

/// HTTP body of a direct FIFO stock issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockIssueRequest {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub model: Option<String>,
    pub order_id: Option<OrderId>,
}

/// One validated deduction line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionItem {
    pub product_id: ProductId,
    pub quantity: Quantity,
}

/// Canonical deduction task handed to the ledger engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionTask {
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub order_number: Option<String>,
    pub items: Vec<DeductionItem>,
}

impl DeductionTask {
    pub fn key_for(&self, item: &DeductionItem) -> StockKey {
        StockKey::new(self.tenant_id, self.warehouse_id, item.product_id)
    }

    /// Queue payload for this task.
    pub fn to_payload(&self) -> DeductStockPayload {
        DeductStockPayload {
            tenant_id: self.tenant_id,
            order_id: self.order_id,
            order_number: self.order_number.clone().unwrap_or_default(),
            warehouse_id: self.warehouse_id,
            items: self
                .items
                .iter()
                .map(|i| OrderItem {
                    product_id: i.product_id,
                    quantity: i.quantity,
                })
                .collect(),
        }
    }
}

/// Canonical FIFO issue request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssue {
    pub key: StockKey,
    pub quantity: Quantity,
    pub model: String,
    pub order_id: Option<OrderId>,
}

/// A validated order plus the lane it should be enqueued on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedOrder {
    pub task: DeductionTask,
    pub lane: String,
}

/// Validator and lane policy for inbound requests.
#[derive(Debug, Clone)]
pub struct TaskIntake {
    lanes: Vec<String>,
    default_lane: String,
}

impl Default for TaskIntake {
    fn default() -> Self {
        Self::new(["critical", "default"], "default")
    }
}

impl TaskIntake {
    pub fn new<I, S>(lanes: I, default_lane: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let default_lane = default_lane.into();
        let mut lanes: Vec<String> = lanes.into_iter().map(Into::into).collect();
        if !lanes.contains(&default_lane) {
            lanes.push(default_lane.clone());
        }
        Self { lanes, default_lane }
    }

    pub fn lanes(&self) -> &[String] {
        &self.lanes
    }

    pub fn default_lane(&self) -> &str {
        &self.default_lane
    }

    /// Validate a delivered queue payload.
    pub fn validate_payload(&self, payload: &DeductStockPayload) -> DomainResult<DeductionTask> {
        require_id(payload.tenant_id.get(), "tenant_id")?;
        require_id(payload.warehouse_id.get(), "warehouse_id")?;
        require_id(payload.order_id.get(), "order_id")?;
        let items = validate_items(&payload.items)?;

        Ok(DeductionTask {
            tenant_id: payload.tenant_id,
            warehouse_id: payload.warehouse_id,
            order_id: payload.order_id,
            order_number: non_empty(&payload.order_number),
            items,
        })
    }

    /// Validate an HTTP order submission and pick its lane.
    pub fn accept_order(&self, tenant_id: TenantId, request: &OrderRequest) -> DomainResult<AcceptedOrder> {
        let lane = self.resolve_lane(request.priority.as_deref())?;
        let task = self.validate_payload(&DeductStockPayload {
            tenant_id,
            order_id: request.order_id,
            order_number: request.order_number.clone(),
            warehouse_id: request.warehouse_id,
            items: request.items.clone(),
        })?;
        Ok(AcceptedOrder { task, lane })
    }

    /// Validate a direct stock-issue request.
    pub fn validate_issue(&self, request: &StockIssueRequest) -> DomainResult<StockIssue> {
        require_id(request.tenant_id.get(), "tenant_id")?;
        require_id(request.warehouse_id.get(), "warehouse_id")?;
        require_id(request.product_id.get(), "product_id")?;
        if !is_positive(request.quantity) {
            return Err(DomainError::validation("quantity", "must be greater than zero"));
        }
        if let Some(order_id) = request.order_id {
            require_id(order_id.get(), "order_id")?;
        }

        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(MODEL_ISSUE)
            .to_string();

        Ok(StockIssue {
            key: StockKey::new(request.tenant_id, request.warehouse_id, request.product_id),
            quantity: request.quantity,
            model,
            order_id: request.order_id,
        })
    }

    fn resolve_lane(&self, requested: Option<&str>) -> DomainResult<String> {
        match requested.map(str::trim).filter(|p| !p.is_empty()) {
            None => Ok(self.default_lane.clone()),
            Some(name) if self.lanes.iter().any(|l| l == name) => Ok(name.to_string()),
            Some(name) => Err(DomainError::validation(
                "priority",
                format!("unknown lane `{name}` (expected one of: {})", self.lanes.join(", ")),
            )),
        }
    }
}

/// Ids are positive; `0` is the decoded form of a missing field.
fn require_id(value: i64, field: impl Into<String>) -> DomainResult<()> {
    match value {
        0 => Err(DomainError::validation(field, "is required")),
        v if v < 0 => Err(DomainError::validation(field, "must be a positive id")),
        _ => Ok(()),
    }
}

fn validate_items(items: &[OrderItem]) -> DomainResult<Vec<DeductionItem>> {
    if items.is_empty() {
        return Err(DomainError::validation("items", "must contain at least one item"));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        require_id(item.product_id.get(), format!("items[{i}].product_id"))?;
        if !is_positive(item.quantity) {
            return Err(DomainError::validation(
                format!("items[{i}].quantity"),
                "must be greater than zero",
            ));
        }
        if !seen.insert(item.product_id) {
            return Err(DomainError::validation(
                format!("items[{i}].product_id"),
                format!("product {} appears more than once", item.product_id),
            ));
        }
        out.push(DeductionItem {
            product_id: item.product_id,
            quantity: item.quantity,
        });
    }
    Ok(out)
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
