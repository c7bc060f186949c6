//! Retry with exponential backoff and uniform jitter.
//!
//! Shared by the IPFS and chain clients. Only errors the caller classifies
//! as retryable trigger another attempt; everything else returns
//! immediately. The delay for attempt `n` is
//! `base × 2^(n-1) + uniform[0, 1000)ms`.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff parameters for one logical operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retry attempts after the initial request.
    pub max_retries: u32,
    /// Base delay, doubled on every attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (1-based), jitter included.
    ///
    /// `rand::thread_rng` keeps the jitter source thread-safe.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1));
        exp + Duration::from_millis(rand::thread_rng().gen_range(0..1000))
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the policy is
/// exhausted; the final attempt's error is returned as-is.
pub async fn retry<T, E, F, Fut, P>(policy: &RetryPolicy, is_retryable: P, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    for attempt in 1..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    "transient failure, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
    op().await
}
