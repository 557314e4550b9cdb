use std::future::Future;

use tracing::warn;

use super::error::LedgerError;
use crate::jobs::RetryPolicy;

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only transient failures are retried. Each attempt is a brand-new run of
/// `op` (attempt numbers start at 1); nothing carries over between attempts.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Err(err) if err.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient ledger failure; retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
