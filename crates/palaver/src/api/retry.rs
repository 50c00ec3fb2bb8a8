//! Automatic retry with exponential backoff and jitter.
//!
//! Only [transient](crate::ProviderError::is_transient) provider failures
//! are retried: rate limits, 5xx responses, and network errors. Client
//! errors such as 400 or 401 fail immediately.

use crate::error::ProviderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = fail on the first error).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Fixed per-attempt factors; spreads retries without a RNG.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

impl RetryConfig {
    /// Longest a full retry sequence can take when every attempt runs for
    /// `per_attempt`: all attempts plus every backoff sleep between them.
    pub fn worst_case(&self, per_attempt: Duration) -> Duration {
        let sleeps: Duration = (0..self.max_retries)
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum();
        per_attempt * (self.max_retries + 1) + sleeps
    }
}

/// Run `call` until it succeeds, fails permanently, or retries run out.
pub async fn retry_call<T, F, Fut>(config: &RetryConfig, mut call: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < config.max_retries && e.is_transient() => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient provider error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
