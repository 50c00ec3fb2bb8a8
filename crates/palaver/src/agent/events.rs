//! Observing the chat loop.
//!
//! The [`ChatLoop`](super::chat_loop::ChatLoop) reports what it is doing
//! through [`ChatEvent`]s. Implement [`EventHandler`] to render tool-usage
//! notices, collect metrics, or log.

use crate::error::ProviderError;
use crate::tools::core::ToolResult;
use crate::ToolCall;
use tracing::{debug, info, warn};

/// Something that happened during a turn.
#[derive(Debug)]
pub enum ChatEvent<'a> {
    /// A user message is about to be appended.
    TurnStarted { session_id: &'a str, input: &'a str },
    /// The model is about to be asked for its next step.
    CycleStart { cycle: usize, max_cycles: usize },
    /// The model requested tools.
    ToolCallsReceived { cycle: usize, count: usize },
    /// A tool is about to run.
    ToolExecuting { call: &'a ToolCall },
    /// A tool finished (successfully or not).
    ToolResult {
        call: &'a ToolCall,
        result: &'a ToolResult,
    },
    /// The model replied with text; the turn is done.
    Reply(&'a str),
    /// The model call failed; the turn is over.
    ModelError(&'a ProviderError),
    /// The turn hit its cycle bound without a reply.
    CycleLimitReached { max_cycles: usize },
}

/// Receives [`ChatEvent`]s. The default implementation ignores them.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ChatEvent<'_>) {
        let _ = event;
    }
}

/// Ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// ```ignore
/// let handler = FnEventHandler::new(|event| {
///     if let ChatEvent::ToolExecuting { call } = event {
///         eprintln!("using {}", call.name);
///     }
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ChatEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ChatEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ChatEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ChatEvent<'_>) {
        (self.0)(event)
    }
}

/// Forwards every event to each inner handler, in registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(!quiet, TerminalNotices::new(style));
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &ChatEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs events through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ChatEvent<'_>) {
        match event {
            ChatEvent::TurnStarted { session_id, input } => {
                debug!("[{session_id}] user: {} chars", input.len());
            }
            ChatEvent::CycleStart { cycle, max_cycles } => {
                debug!("[cycle {cycle}/{max_cycles}] awaiting model");
            }
            ChatEvent::ToolCallsReceived { cycle, count } => {
                info!("{count} tool call(s) in cycle {cycle}");
            }
            ChatEvent::ToolExecuting { call } => {
                debug!("Executing tool: {} ({})", call.name, call.id);
            }
            ChatEvent::ToolResult { call, result } => {
                if result.is_error {
                    warn!("Tool {} failed: {}", call.name, result.content);
                } else {
                    debug!("Tool {} result: {} bytes", call.name, result.content.len());
                }
            }
            ChatEvent::Reply(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "Model reply: {preview}{}",
                    if preview.len() < text.len() { "..." } else { "" }
                );
            }
            ChatEvent::ModelError(e) => warn!("Model call failed: {e}"),
            ChatEvent::CycleLimitReached { max_cycles } => {
                warn!("Turn stopped after {max_cycles} cycles without a reply");
            }
        }
    }
}
