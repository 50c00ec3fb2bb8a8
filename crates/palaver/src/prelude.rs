//! Convenience re-exports for common `palaver` types.
//!
//! ```ignore
//! use palaver::prelude::*;
//! ```
//!
//! Covers what most programs need to run a chat: messages, the loop and its
//! config, models, the tool registry and built-in tools, and the stores.
//! Wire-level types (`ChatRequest`, `WireMessage`) stay in [`crate::api`].

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    Arguments, ChatError, DEFAULT_MODEL, Message, MessageRole, ProviderError, ToolCall, ToolDef,
    ToolError, json_schema_for,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    ChatEvent, ChatLoop, CompositeEventHandler, EventHandler, FnEventHandler, LoggingHandler,
    LoopConfig, NoopHandler, TurnOutcome,
};

// ── Models ──────────────────────────────────────────────────────────
pub use crate::api::{ChatClient, RetryConfig};
pub use crate::model::{ChatModel, Decision, RemoteModel, ScriptedModel};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    FnTool, SearchBackend, SqlDatabase, Tool, ToolDescription, ToolFuture, ToolSet, WebSearch,
    parse_tool_args,
};

// ── Sessions ────────────────────────────────────────────────────────
pub use crate::session::{Conversation, FileStore, MemoryStore, SessionStore};
