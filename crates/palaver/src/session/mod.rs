//! Conversation state and its persistence.
//!
//! - [`state::Conversation`]: the append-only message history of one session.
//! - [`store::SessionStore`]: the keyed store the chat loop writes through to,
//!   with [`store::MemoryStore`] for process-local sessions.
//! - [`file_store::FileStore`]: sessions on disk as JSON lines plus a manifest.

pub mod file_store;
pub mod state;
pub mod store;

pub use file_store::{DEFAULT_SESSIONS_DIR, FileStore, SessionManifest};
pub use state::Conversation;
pub use store::{MemoryStore, SessionStore, generate_session_id, validate_session_id};
