use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use stockflow_events::SinkOutcome;

/// Attempt budget for one delivery. The pause after failed attempt `n`
/// (1-based) is `n * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRetry {
    pub attempts: u32,
    pub step: Duration,
}

impl DeliveryRetry {
    pub fn new(attempts: u32, step: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            step,
        }
    }

    fn pause_after(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

#[derive(Debug, Clone)]
pub(crate) struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

/// POST `body` as JSON to `target`; any non-2xx status counts as a failure.
pub(crate) async fn post_json(
    client: &Client,
    sink: &str,
    target: &str,
    body: &serde_json::Value,
    auth: Option<&BasicAuth>,
    retry: DeliveryRetry,
) -> SinkOutcome {
    let mut last_error = String::new();

    for attempt in 1..=retry.attempts {
        let mut request = client.post(target).json(body);
        if let Some(auth) = auth {
            request = request.basic_auth(&auth.username, auth.password.as_ref());
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(sink, target, attempt, status = %response.status(), "event delivered");
                return SinkOutcome::Delivered { attempts: attempt };
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                last_error = format!("HTTP {} - {}", status, text.chars().take(200).collect::<String>());
            }
            Err(err) => last_error = err.to_string(),
        }

        warn!(sink, target, attempt, error = %last_error, "event delivery failed");
        if attempt < retry.attempts {
            tokio::time::sleep(retry.pause_after(attempt)).await;
        }
    }

    SinkOutcome::Failed {
        attempts: retry.attempts,
        error: last_error,
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}
