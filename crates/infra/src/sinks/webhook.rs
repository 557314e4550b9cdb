//! Webhook sink.
//!
//! POSTs each event as JSON. When the configured URL carries no path, the
//! target becomes `{scheme}://{host}/{alias}/_doc` with the alias chosen by
//! event type, which lets the sink write straight into search-cluster write
//! aliases.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use stockflow_events::{EventKind, EventSink, OutcomeEvent, SinkOutcome};

use super::SinkError;
use super::http::{DeliveryRetry, build_client, post_json};

/// Write alias per event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasMap {
    pub order: String,
    pub debug: String,
    pub query: String,
    pub fallback: String,
}

impl Default for AliasMap {
    fn default() -> Self {
        Self {
            order: "stockflow-hooks-write".to_string(),
            debug: "stockflow-debug-write".to_string(),
            query: "stockflow-queries-write".to_string(),
            fallback: "stockflow-all-write".to_string(),
        }
    }
}

impl AliasMap {
    pub fn for_kind(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::Order => &self.order,
            EventKind::Debug => &self.debug,
            EventKind::Query => &self.query,
            EventKind::StockIssue => &self.fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub pipeline: Option<String>,
    pub aliases: AliasMap,
    pub timeout: Duration,
    pub retry: DeliveryRetry,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pipeline: None,
            aliases: AliasMap::default(),
            timeout: Duration::from_secs(5),
            retry: DeliveryRetry::new(3, Duration::from_millis(200)),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Option<String>) -> Self {
        self.pipeline = pipeline.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn with_aliases(mut self, aliases: AliasMap) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: DeliveryRetry) -> Self {
        self.retry = retry;
        self
    }
}

pub struct WebhookSink {
    client: Client,
    config: WebhookConfig,
}

impl std::fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSink").field("url", &self.config.url).finish()
    }
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self, SinkError> {
        if config.url.trim().is_empty() {
            return Err(SinkError::Config("webhook url not configured".to_string()));
        }
        let client = build_client(config.timeout)?;
        Ok(Self { client, config })
    }

    /// Where an event of `kind` is posted.
    pub fn target_url(&self, kind: EventKind) -> String {
        let target = match Url::parse(&self.config.url) {
            Ok(parsed) if parsed.path().trim_end_matches('/').is_empty() => {
                let host = parsed.host_str().unwrap_or_default();
                let port = parsed.port().map(|p| format!(":{p}")).unwrap_or_default();
                format!(
                    "{}://{}{}/{}/_doc",
                    parsed.scheme(),
                    host,
                    port,
                    self.config.aliases.for_kind(kind)
                )
            }
            _ => self.config.url.clone(),
        };

        match (self.config.pipeline.as_deref(), Url::parse(&target)) {
            (Some(pipeline), Ok(mut url)) => {
                url.query_pairs_mut().append_pair("pipeline", pipeline);
                url.to_string()
            }
            _ => target,
        }
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn record(&self, event: &OutcomeEvent) -> SinkOutcome {
        let body = match serde_json::to_value(event) {
            Ok(body) => body,
            Err(err) => {
                return SinkOutcome::Failed {
                    attempts: 0,
                    error: err.to_string(),
                };
            }
        };
        let target = self.target_url(event.kind);
        post_json(&self.client, self.name(), &target, &body, None, self.config.retry).await
    }
}
