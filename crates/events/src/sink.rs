//! Pluggable outcome sinks.
//!
//! A sink receives a finished [`OutcomeEvent`] and is responsible for its own
//! transport and retry policy. The ledger never sees sink failures: a sink that
//! gives up reports [`SinkOutcome::Failed`] and the reporter logs it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::OutcomeEvent;

/// Result of recording one event in one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOutcome {
    Delivered { attempts: u32 },
    /// The sink is configured to ignore this event.
    Skipped,
    Failed { attempts: u32, error: String },
}

impl SinkOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SinkOutcome::Delivered { .. })
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    async fn record(&self, event: &OutcomeEvent) -> SinkOutcome;
}

#[async_trait]
impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn record(&self, event: &OutcomeEvent) -> SinkOutcome {
        (**self).record(event).await
    }
}
