//! Keyed conversation persistence.

use super::state::Conversation;
use crate::Message;
use crate::error::ChatError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A passive store of conversations addressed by session id.
///
/// `load` of an unknown id yields an empty conversation and repeated loads
/// without an intervening `append` return the same state. `append` only
/// ever adds to the end. Callers guarantee at most one writer per id.
pub trait SessionStore: Send + Sync {
    fn load(&self, session_id: &str) -> Result<Conversation, ChatError>;

    fn append(&self, session_id: &str, message: &Message) -> Result<(), ChatError>;
}

/// In-process store. Conversations last as long as the store does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, session_id: &str) -> Result<Conversation, ChatError> {
        let messages = self
            .sessions
            .lock()
            .map_err(|e| ChatError::load(session_id, e))?
            .get(session_id)
            .cloned()
            .unwrap_or_default();
        Conversation::from_messages(session_id, messages)
    }

    fn append(&self, session_id: &str, message: &Message) -> Result<(), ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::write(session_id, e))?
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}

/// Generate a fresh session id, e.g. `s-18f2c3a4b5d6e7f8-0001`.
pub fn generate_session_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let ts = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("s-{ts:x}-{count:04x}")
}

/// Reject ids that cannot be used as a single path component.
pub fn validate_session_id(session_id: &str) -> Result<(), ChatError> {
    let ok = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id != "."
        && session_id != ".."
        && !session_id.starts_with('.')
        && session_id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ChatError::load(
            session_id,
            "session ids may only contain letters, digits, '-', '_' and '.' and must not start with '.'",
        ))
    }
}
