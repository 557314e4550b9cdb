//! Fan-out of outcome events to every configured sink.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::OutcomeEvent;
use crate::sink::{EventSink, SinkOutcome};

/// Per-sink result of one report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSummary {
    pub outcomes: Vec<(String, SinkOutcome)>,
}

impl ReportSummary {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_delivered()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SinkOutcome::Failed { .. }))
            .count()
    }
}

/// Forwards each event to all sinks, in registration order.
///
/// Sink failures are logged and summarised; they never propagate to the
/// caller.
#[derive(Clone, Default)]
pub struct Reporter {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl core::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Reporter")
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub async fn report(&self, event: &OutcomeEvent) -> ReportSummary {
        let mut outcomes = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let outcome = sink.record(event).await;
            match &outcome {
                SinkOutcome::Failed { attempts, error } => warn!(
                    sink = sink.name(),
                    event_id = %event.event_id,
                    attempts,
                    error = %error,
                    "sink gave up on outcome event"
                ),
                other => debug!(sink = sink.name(), event_id = %event.event_id, outcome = ?other, "outcome recorded"),
            }
            outcomes.push((sink.name().to_string(), outcome));
        }
        ReportSummary { outcomes }
    }
}
