//! HTTP client for OpenAI-compatible chat completion endpoints.
//!
//! Conversation messages are converted to the wire format here: tool call
//! arguments travel as JSON-encoded strings and the optional system prompt
//! becomes a leading `system` message that is never stored in history.

use crate::error::ProviderError;
use crate::{Arguments, Message, MessageRole, ToolCall, ToolDef};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// OpenRouter's OpenAI-compatible API root.
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ChatRequest {
    /// Build a request from conversation history and the full tool set.
    pub fn new(
        model: impl Into<String>,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDef],
    ) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt
            && !prompt.is_empty()
        {
            messages.push(WireMessage {
                role: "system".into(),
                content: Some(prompt.to_string()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.extend(history.iter().map(WireMessage::from));

        Self {
            model: model.into(),
            messages,
            tools: tools.to_vec(),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
            ..Default::default()
        }
    }
}

/// A message in OpenAI wire format.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WireMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = (!msg.tool_calls.is_empty())
            .then(|| msg.tool_calls.iter().map(WireToolCall::from).collect());
        Self {
            role: msg.role.to_string(),
            // Assistant tool-call messages go out with null content.
            content: match msg.role {
                MessageRole::Assistant if tool_calls.is_some() => msg.content.clone(),
                _ => Some(msg.text().to_string()),
            },
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call in wire format; arguments are a JSON string.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WireToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl From<&ToolCall> for WireToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: call.name.clone(),
                arguments: call.arguments_json(),
            },
        }
    }
}

impl WireToolCall {
    /// Decode into a [`ToolCall`].
    ///
    /// Empty arguments decode to an empty map. Arguments that are not a JSON
    /// object are kept under `_raw` so the tool reports them as invalid.
    pub fn into_tool_call(self) -> ToolCall {
        let raw = self.function.arguments;
        let arguments = if raw.trim().is_empty() {
            Arguments::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => {
                    warn!(
                        "Tool call '{}' has undecodable arguments: {raw}",
                        self.function.name
                    );
                    let mut map = Arguments::new();
                    map.insert("_raw".into(), serde_json::Value::String(raw));
                    map
                }
            }
        };
        ToolCall {
            id: self.id,
            name: self.function.name,
            arguments,
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Parsed chat completion.
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Parse a successful (2xx) response body.
pub fn parse_completion(body: &str) -> Result<ChatCompletion, ProviderError> {
    let parsed: RawChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if let Some(err) = parsed.error {
        return Err(ProviderError::Api(err.message));
    }

    let choice = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ProviderError::Malformed("response has no choices".into()))?;

    Ok(ChatCompletion {
        content: choice.message.content,
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_tool_call)
            .collect(),
        usage: parsed.usage,
        finish_reason: choice.finish_reason,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions API.
pub struct ChatClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
}

impl ChatClient {
    /// Client for OpenRouter with the default timeout.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, OPENROUTER_BASE_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client for any OpenAI-compatible API root, e.g.
    /// `https://api.openai.com/v1`.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("palaver/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, ProviderError> {
        debug!(
            "LLM request: model={}, messages={}, tools={}",
            body.model,
            body.messages.len(),
            body.tools.len(),
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "palaver")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("failed to read response: {e}")))?;

        debug!(
            "LLM response: HTTP {status} in {:.1}s ({} bytes)",
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let completion = parse_completion(&text)?;

        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }
        debug!(
            "LLM output: {} chars text, {} tool call(s), finish_reason={:?}",
            completion.content.as_ref().map_or(0, |s| s.len()),
            completion.tool_calls.len(),
            completion.finish_reason,
        );

        Ok(completion)
    }
}
