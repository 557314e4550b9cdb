//! Process configuration.
//!
//! Loaded from `config/stockflow.toml` (optional) and then `STOCKFLOW__*`
//! environment variables, e.g. `STOCKFLOW__QUEUE__CONCURRENCY=4` or
//! `STOCKFLOW__DATABASE__URL=postgres://...`. Every field has a default, so an
//! empty environment yields a runnable in-memory setup.

use std::collections::BTreeMap;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use stockflow_observability::{LogFormat, LogSettings};

use crate::jobs::{JobExecutorConfig, RetryPolicy};

pub const CONFIG_FILE: &str = "config/stockflow.toml";
pub const ENV_PREFIX: &str = "STOCKFLOW";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub sinks: SinkSettings,
    #[serde(default)]
    pub logging: LogSettings,
}

impl AppConfig {
    /// Load from the default file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE, Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    pub fn load_from(file: &str, env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatabaseSettings {
    /// Postgres URL; unset selects the in-memory ledger.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Apply the bundled schema at startup.
    #[serde(default = "default_true")]
    pub migrate: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            migrate: true,
        }
    }
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QueueSettings {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Redeliveries after the first attempt.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Lane name to polling weight.
    #[serde(default = "default_lanes")]
    pub lanes: BTreeMap<String, u32>,
    #[serde(default = "default_lane")]
    pub default_lane: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retry: default_max_retry(),
            task_timeout_secs: default_task_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            lanes: default_lanes(),
            default_lane: default_lane(),
        }
    }
}

impl QueueSettings {
    pub fn lane_names(&self) -> Vec<String> {
        self.lanes.keys().cloned().collect()
    }

    /// Policy attached to every enqueued task.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::for_max_retry(
            self.max_retry,
            Duration::from_millis(self.retry_base_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }

    pub fn executor_config(&self) -> JobExecutorConfig {
        JobExecutorConfig::default()
            .with_name("stockflow-queue")
            .with_concurrency(self.concurrency)
            .with_task_timeout(Duration::from_secs(self.task_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_lanes(self.lanes.iter().map(|(lane, weight)| (lane.clone(), *weight)).collect())
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_max_retry() -> u32 {
    10
}

fn default_task_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_retry_base_ms() -> u64 {
    500
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_lanes() -> BTreeMap<String, u32> {
    BTreeMap::from([("critical".to_string(), 2), ("default".to_string(), 1)])
}

fn default_lane() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LedgerSettings {
    /// Extra attempts the synchronous HTTP paths make on transient failures.
    #[serde(default = "default_sync_retry_attempts")]
    pub sync_retry_attempts: u32,
    #[serde(default = "default_sync_retry_base_ms")]
    pub sync_retry_base_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            sync_retry_attempts: default_sync_retry_attempts(),
            sync_retry_base_ms: default_sync_retry_base_ms(),
        }
    }
}

impl LedgerSettings {
    pub fn sync_retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.sync_retry_base_ms);
        RetryPolicy::for_max_retry(self.sync_retry_attempts, base, base * 8)
    }
}

fn default_sync_retry_attempts() -> u32 {
    3
}

fn default_sync_retry_base_ms() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SinkSettings {
    #[serde(default = "default_true")]
    pub app_log: bool,
    /// Webhook endpoint; unset disables the webhook sink.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Ingest pipeline appended as `?pipeline=`.
    #[serde(default)]
    pub webhook_pipeline: Option<String>,
    /// Search cluster base URL; unset disables the search-index sink.
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default = "default_search_index")]
    pub search_index: String,
    #[serde(default)]
    pub search_username: Option<String>,
    #[serde(default)]
    pub search_password: Option<String>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            app_log: true,
            webhook_url: None,
            webhook_pipeline: None,
            search_url: None,
            search_index: default_search_index(),
            search_username: None,
            search_password: None,
        }
    }
}

fn default_search_index() -> String {
    "stockflow-logs-write".to_string()
}
