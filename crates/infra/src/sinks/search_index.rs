use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use stockflow_events::{EventSink, OutcomeEvent, SinkOutcome};

use super::SinkError;
use super::http::{BasicAuth, DeliveryRetry, build_client, post_json};

#[derive(Debug, Clone)]
pub struct SearchIndexConfig {
    /// Cluster base URL, e.g. `https://search:9200`.
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
    pub retry: DeliveryRetry,
}

impl SearchIndexConfig {
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
            retry: DeliveryRetry::new(3, Duration::from_secs(1)),
        }
    }

    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password;
        self
    }

    pub fn with_retry(mut self, retry: DeliveryRetry) -> Self {
        self.retry = retry;
        self
    }
}

/// Indexes each event as one document in a fixed index.
pub struct SearchIndexSink {
    client: Client,
    target: String,
    auth: Option<BasicAuth>,
    retry: DeliveryRetry,
}

impl std::fmt::Debug for SearchIndexSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchIndexSink").field("target", &self.target).finish()
    }
}

impl SearchIndexSink {
    pub fn new(config: SearchIndexConfig) -> Result<Self, SinkError> {
        let base = config.url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(SinkError::Config("search url not configured".to_string()));
        }
        if config.index.trim().is_empty() {
            return Err(SinkError::Config("search index not configured".to_string()));
        }

        Ok(Self {
            client: build_client(config.timeout)?,
            target: format!("{}/{}/_doc", base, config.index.trim()),
            auth: config.username.map(|username| BasicAuth {
                username,
                password: config.password,
            }),
            retry: config.retry,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl EventSink for SearchIndexSink {
    fn name(&self) -> &str {
        "search-index"
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
        post_json(&self.client, self.name(), &self.target, &body, self.auth.as_ref(), self.retry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_index_doc_endpoint() {
        let sink = SearchIndexSink::new(SearchIndexConfig::new("https://search:9200/", "stockflow-logs-write")).unwrap();
        assert_eq!(sink.target(), "https://search:9200/stockflow-logs-write/_doc");
    }

    #[test]
    fn blank_username_disables_auth() {
        let sink = SearchIndexSink::new(
            SearchIndexConfig::new("http://search:9200", "logs").with_credentials(Some(String::new()), None),
        )
        .unwrap();
        assert!(sink.auth.is_none());
    }

    #[test]
    fn missing_index_is_rejected() {
        assert!(SearchIndexSink::new(SearchIndexConfig::new("http://search:9200", "")).is_err());
    }
}
