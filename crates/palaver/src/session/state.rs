//! Append-only conversation history.

use crate::error::ChatError;
use crate::{Message, MessageRole, ToolCall};
use std::collections::HashSet;

/// The ordered messages of one session.
///
/// Messages can only be appended. Every tool message must answer a call
/// from an earlier assistant message that has not been answered yet, and
/// call ids are unique across the whole history; [`push`](Self::push)
/// rejects anything else and leaves the conversation unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    session_id: String,
    messages: Vec<Message>,
    seen_call_ids: HashSet<String>,
    open_calls: Vec<ToolCall>,
}

impl Conversation {
    /// An empty conversation.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            seen_call_ids: HashSet::new(),
            open_calls: Vec::new(),
        }
    }

    /// Rebuild a conversation from stored messages, re-checking every append.
    pub fn from_messages(
        session_id: impl Into<String>,
        messages: impl IntoIterator<Item = Message>,
    ) -> Result<Self, ChatError> {
        let mut conversation = Self::new(session_id);
        for message in messages {
            conversation.push(message)?;
        }
        Ok(conversation)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Calls from assistant messages that still have no result, in order.
    pub fn open_calls(&self) -> &[ToolCall] {
        &self.open_calls
    }

    /// Whether `message` could be appended right now.
    pub fn check(&self, message: &Message) -> Result<(), ChatError> {
        match message.role {
            MessageRole::Tool => {
                let call_id = message.tool_call_id.as_deref().unwrap_or_default();
                if !self.open_calls.iter().any(|c| c.id == call_id) {
                    return Err(ChatError::OrphanToolResult {
                        call_id: call_id.to_string(),
                    });
                }
            }
            MessageRole::Assistant => {
                let mut batch = HashSet::new();
                for call in &message.tool_calls {
                    if self.seen_call_ids.contains(&call.id) || !batch.insert(call.id.as_str()) {
                        return Err(ChatError::DuplicateToolCall {
                            call_id: call.id.clone(),
                        });
                    }
                }
            }
            MessageRole::User => {}
        }
        Ok(())
    }

    /// Append a message, enforcing the tool-call invariants.
    pub fn push(&mut self, message: Message) -> Result<(), ChatError> {
        self.check(&message)?;
        match message.role {
            MessageRole::Tool => {
                let call_id = message.tool_call_id.as_deref().unwrap_or_default();
                self.open_calls.retain(|c| c.id != call_id);
            }
            MessageRole::Assistant => {
                self.seen_call_ids
                    .extend(message.tool_calls.iter().map(|c| c.id.clone()));
                self.open_calls.extend(message.tool_calls.iter().cloned());
            }
            MessageRole::User => {}
        }
        self.messages.push(message);
        Ok(())
    }
}
