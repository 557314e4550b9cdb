//! Outcome events and the pluggable sink interface.
//!
//! The ledger emits one [`OutcomeEvent`] per processing attempt; a [`Reporter`]
//! forwards it to every configured [`EventSink`]. Transport and retry are each
//! sink's own concern.

pub mod in_memory_sink;
pub mod outcome;
pub mod reporter;
pub mod sink;
pub mod tenant;

pub use in_memory_sink::InMemorySink;
pub use outcome::{EventKind, OutcomeEvent, OutcomeItem, OutcomeStatus};
pub use reporter::{ReportSummary, Reporter};
pub use sink::{EventSink, SinkOutcome};
pub use tenant::TenantScoped;
