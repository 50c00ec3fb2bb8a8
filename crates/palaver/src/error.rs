//! Error types.
//!
//! [`ChatError`] is what a turn or a store operation can fail with.
//! [`ToolError`] never leaves the tool registry: it is rendered into the
//! content of a tool result so the model can react to it.

use std::time::Duration;
use thiserror::Error;

/// Failure of a chat turn, a store operation, or startup configuration.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The model call failed after any retries.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The model asked for a tool that is not registered.
    #[error("model requested unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("failed to load session '{session_id}': {reason}")]
    SessionLoad { session_id: String, reason: String },

    #[error("failed to write session '{session_id}': {reason}")]
    SessionWrite { session_id: String, reason: String },

    /// A tool result did not answer an open tool call.
    #[error("tool result for '{call_id}' does not answer an open tool call")]
    OrphanToolResult { call_id: String },

    /// A tool call id was reused within the conversation.
    #[error("tool call id '{call_id}' is already in use")]
    DuplicateToolCall { call_id: String },

    #[error("no reply from the model after {max_cycles} cycles")]
    CycleLimitReached { max_cycles: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ChatError {
    pub(crate) fn load(session_id: &str, reason: impl std::fmt::Display) -> Self {
        ChatError::SessionLoad {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(session_id: &str, reason: impl std::fmt::Display) -> Self {
        ChatError::SessionWrite {
            session_id: session_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Failure talking to the model provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error: {0}")]
    Api(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// A scripted model ran out of prepared decisions.
    #[error("no scripted decision left")]
    Exhausted,
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits, server errors, and network failures are transient.
    /// Client errors (400, 401, 403, 404, 422) and malformed payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::Api(message) => {
                let lower = message.to_lowercase();
                ["rate limit", "overloaded", "timeout", "temporarily"]
                    .iter()
                    .any(|p| lower.contains(p))
            }
            ProviderError::Malformed(_) | ProviderError::Exhausted => false,
        }
    }
}

/// Failure of a single tool execution.
///
/// Displayed as the tool result content, always starting with `Error:`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error("Error: invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Error: {0}")]
    Execution(String),

    #[error("Error: tool '{tool}' timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Error: tool call cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        ToolError::Execution(message.into())
    }
}
