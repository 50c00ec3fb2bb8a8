//! Chat loop configuration.

use std::time::Duration;

/// Default bound on model calls per user turn.
pub const DEFAULT_MAX_CYCLES: usize = 10;

/// Default bound on one model decision, retries included.
///
/// This bound wins over the adapter's own retries: if it expires first the
/// decision fails with `ProviderError::Timeout` rather than the last
/// transient error. Size it with [`RetryConfig::worst_case`] when the retry
/// policy changes.
///
/// [`RetryConfig::worst_case`]: crate::api::RetryConfig::worst_case
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for [`ChatLoop`](super::chat_loop::ChatLoop).
///
/// Tool timeouts live on the [`ToolSet`](crate::tools::core::ToolSet) and
/// retry policy on the model adapter; this covers the loop itself.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum model calls per turn. A turn that has not produced a reply
    /// by then ends with `CycleLimitReached`.
    pub max_cycles: usize,
    /// Upper bound on a single `decide` call, retries included. `None` waits
    /// indefinitely.
    pub model_timeout: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            model_timeout: Some(DEFAULT_MODEL_TIMEOUT),
        }
    }
}

impl LoopConfig {
    /// Set the cycle bound. Values below 1 are raised to 1.
    pub fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = max_cycles.max(1);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.model_timeout = timeout;
        self
    }
}
