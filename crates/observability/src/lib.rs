//! Tracing and logging setup shared by the binaries.

use serde::Deserialize;

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use crate::tracing::init_with;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogSettings {
    /// Used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::Json,
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

/// Initialize process-wide logging with defaults (JSON, `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    init_with(&LogSettings::default());
}
