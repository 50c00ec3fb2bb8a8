//! Tool-calling chat agent runtime.
//!
//! `palaver` drives a conversation between a user, a language model and a set
//! of tools. The core abstraction is the [`ChatLoop`](agent::chat_loop::ChatLoop):
//! it appends the user's message, asks a [`ChatModel`](model::ChatModel) what
//! to do next, executes any requested tool calls through a
//! [`ToolSet`](tools::core::ToolSet), appends the results, and repeats until
//! the model produces a plain reply or the cycle bound is reached.
//!
//! Every appended message is written through to a
//! [`SessionStore`](session::store::SessionStore), so a conversation can be
//! resumed later by its session id.
//!
//! # Getting started
//!
//! ```ignore
//! use palaver::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ChatError> {
//!     let api_key = std::env::var("OPENROUTER_KEY").unwrap();
//!     let model = RemoteModel::new(ChatClient::new(api_key)?, "openai/gpt-4.1");
//!
//!     let tools = ToolSet::new().with(WebSearch::from_env(SearchBackend::Tavily)?);
//!     let store = MemoryStore::new();
//!
//!     let chat = ChatLoop::new(&model, &tools, &store, LoopConfig::default())
//!         .with_event_handler(&LoggingHandler);
//!
//!     let mut conversation = store.load("demo")?;
//!     let outcome = chat.run_turn(&mut conversation, "What is new in Rust?").await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Messages and tool calls:** [`Message`], [`ToolCall`], [`ToolDef`] in
//!   this module.
//! - **The turn loop:** [`agent::chat_loop`] with [`agent::config::LoopConfig`]
//!   and the [`agent::events`] observer hooks.
//! - **Models:** the [`model::ChatModel`] trait, the HTTP-backed
//!   [`model::remote::RemoteModel`] and the [`model::scripted::ScriptedModel`]
//!   stub.
//! - **Tools:** [`tools::core`] for the trait and registry, [`tools::search`]
//!   for web search, [`tools::sql`] for SQLite introspection and queries.
//! - **Persistence:** [`session::state::Conversation`] and the stores in
//!   [`session`].
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Turn loop, configuration, events |
//! | [`api`] | OpenAI-compatible HTTP client, retry with backoff |
//! | [`model`] | Model adapter trait and implementations |
//! | [`session`] | Conversation state and session stores |
//! | [`tools`] | Tool trait, registry, built-in tools |

pub mod agent;
pub mod api;
pub mod error;
pub mod model;
pub mod prelude;
pub mod session;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::{ChatError, ProviderError, ToolError};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

/// Default model for chat turns.
pub const DEFAULT_MODEL: &str = "openai/gpt-4.1";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. Tool definitions use this so the advertised
/// schema and the argument type can never disagree.
///
/// # Example
///
/// ```
/// use palaver::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct QueryArgs {
///     query: String,
///     #[serde(default)]
///     limit: Option<u32>,
/// }
///
/// let schema = json_schema_for::<QueryArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"query".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Arguments of a tool call, keyed by parameter name.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// Assistant messages carry either text or tool calls. Tool messages carry
/// the id of the call they answer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Text content, or the empty string.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether this is an assistant message requesting tools.
    pub fn requests_tools(&self) -> bool {
        self.role == MessageRole::Assistant && !self.tool_calls.is_empty()
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// A model-issued request to invoke a tool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments rendered as a compact JSON object.
    pub fn arguments_json(&self) -> String {
        serde_json::Value::Object(self.arguments.clone()).to_string()
    }
}

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the model (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}
