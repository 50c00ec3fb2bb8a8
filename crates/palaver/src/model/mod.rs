//! Model adapters.
//!
//! A [`ChatModel`] looks at the conversation so far and the full set of
//! tool definitions and decides what happens next: a plain [`Decision::Reply`]
//! ends the turn, a [`Decision::ToolRequest`] asks the loop to run tools.
//!
//! - [`remote::RemoteModel`] talks to an OpenAI-compatible endpoint.
//! - [`scripted::ScriptedModel`] replays prepared decisions, for tests.

pub mod remote;
pub mod scripted;

use crate::error::ProviderError;
use crate::{Message, ToolCall, ToolDef};
use std::future::Future;
use std::pin::Pin;

pub use remote::RemoteModel;
pub use scripted::ScriptedModel;

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A plain text reply; ends the turn.
    Reply(String),
    /// One or more tool invocations, in the order they should run.
    ToolRequest(Vec<ToolCall>),
}

/// Boxed future returned by [`ChatModel::decide`].
pub type ModelFuture<'a> = Pin<Box<dyn Future<Output = Result<Decision, ProviderError>> + Send + 'a>>;

/// A language model that can reply or request tools.
///
/// Implementations keep no conversation state between calls: everything the
/// model needs is passed in `history`.
pub trait ChatModel: Send + Sync {
    /// Decide the next step given the full history and every available tool.
    fn decide<'a>(&'a self, history: &'a [Message], tools: &'a [ToolDef]) -> ModelFuture<'a>;

    /// Human-readable model identifier, for logs and banners.
    fn name(&self) -> &str;
}
