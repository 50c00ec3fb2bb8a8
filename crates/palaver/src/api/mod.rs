//! API interaction layer between the model adapter and the provider.
//!
//! - [`client`]: [`ChatClient`] for OpenAI-compatible chat completion
//!   endpoints (OpenRouter by default), plus the wire types and the
//!   conversion from conversation [`Message`](crate::Message)s.
//! - [`retry`]: exponential backoff with jitter for transient provider
//!   failures. Never retries 400/401 errors.

pub mod client;
pub mod retry;

pub use client::{ChatClient, ChatCompletion, ChatRequest, OPENROUTER_BASE_URL, UsageInfo};
pub use retry::{RetryConfig, retry_call};
