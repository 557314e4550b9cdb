use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockflow_core::{OrderId, TenantId, WarehouseId};

/// Read-only view of an upstream order (`"order"` table).
///
/// The ledger never writes orders; they are served back to callers for
/// inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub warehouse_id: WarehouseId,
    pub order_number: String,
    pub stock_method: Option<String>,
    pub reserved: bool,
    pub issued: bool,
    pub canceled: bool,
    pub returned: bool,
    pub reserved_date: Option<DateTime<Utc>>,
    pub issued_date: Option<DateTime<Utc>>,
    pub canceled_date: Option<DateTime<Utc>>,
    pub returned_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Lifecycle label derived from the flags, most advanced state first.
    pub fn state(&self) -> &'static str {
        if self.returned {
            "returned"
        } else if self.canceled {
            "canceled"
        } else if self.issued {
            "issued"
        } else if self.reserved {
            "reserved"
        } else {
            "open"
        }
    }
}
