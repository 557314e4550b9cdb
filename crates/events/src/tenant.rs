use stockflow_core::TenantId;

use crate::OutcomeEvent;

/// Helper trait for tenant-scoped messages.
///
/// Lets sinks and test helpers filter events by tenant without knowing the
/// concrete message type.
pub trait TenantScoped {
    fn tenant_id(&self) -> TenantId;
}

impl TenantScoped for OutcomeEvent {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
