//! Infrastructure layer: ledger stores and engine, task queue runtime,
//! outcome sinks, configuration and queue workers.

pub mod config;
pub mod jobs;
pub mod ledger;
pub mod sinks;
pub mod workers;
