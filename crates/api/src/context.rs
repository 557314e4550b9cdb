use stockflow_core::TenantId;

/// Tenant context for a request.
///
/// Resolved once from the `tenant` query parameter and immutable afterwards.
/// Tenant-scoped handlers never read the tenant from anywhere else.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
