//! In-memory sink for tests/dev.

use std::sync::Mutex;

use async_trait::async_trait;

use stockflow_core::TenantId;

use crate::sink::{EventSink, SinkOutcome};
use crate::tenant::TenantScoped;
use crate::{OutcomeEvent, OutcomeStatus};

/// Captures every recorded event.
///
/// - No IO
/// - Never fails (a poisoned lock still yields the inner data)
#[derive(Debug, Default)]
pub struct InMemorySink {
    events: Mutex<Vec<OutcomeEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn events_for(&self, tenant_id: TenantId) -> Vec<OutcomeEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.tenant_id() == tenant_id)
            .collect()
    }

    pub fn count_with_status(&self, status: OutcomeStatus) -> usize {
        self.events().iter().filter(|e| e.status == status).count()
    }
}

#[async_trait]
impl EventSink for InMemorySink {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn record(&self, event: &OutcomeEvent) -> SinkOutcome {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        SinkOutcome::Delivered { attempts: 1 }
    }
}
