//! File-backed session store.
//!
//! Each session gets its own directory under the sessions root:
//!
//! ```text
//! sessions_dir/
//!   thread-1/
//!     manifest.json     metadata, replaced atomically on every append
//!     messages.jsonl    one message per line, append-only
//! ```

use super::state::Conversation;
use super::store::{SessionStore, validate_session_id};
use crate::error::ChatError;
use crate::{Message, MessageRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default sessions root, relative to the working directory.
pub const DEFAULT_SESSIONS_DIR: &str = ".palaver/sessions";

const MANIFEST_FILE: &str = "manifest.json";
const MESSAGES_FILE: &str = "messages.jsonl";

/// Metadata for a stored session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionManifest {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    /// First ~200 chars of the first user message.
    pub preview: String,
}

impl SessionManifest {
    fn empty(session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            preview: String::new(),
        }
    }
}

/// [`SessionStore`] keeping each session in its own directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    sessions_dir: PathBuf,
}

impl FileStore {
    /// Create a store, ensuring the sessions root exists.
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Result<Self, ChatError> {
        let sessions_dir = sessions_dir.into();
        fs::create_dir_all(&sessions_dir).map_err(|e| {
            ChatError::Config(format!(
                "cannot create sessions directory {}: {e}",
                sessions_dir.display()
            ))
        })?;
        Ok(Self { sessions_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// Load a session's manifest. `None` if the session does not exist.
    pub fn manifest(&self, session_id: &str) -> Result<Option<SessionManifest>, ChatError> {
        validate_session_id(session_id)?;
        let path = self.session_dir(session_id).join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|e| ChatError::load(session_id, e))?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| ChatError::load(session_id, format!("bad manifest: {e}")))
    }

    /// All sessions, most recently updated first. Unreadable manifests are
    /// skipped with a warning.
    pub fn list_sessions(&self) -> Result<Vec<SessionManifest>, ChatError> {
        let entries = fs::read_dir(&self.sessions_dir).map_err(|e| {
            ChatError::Config(format!(
                "cannot read sessions directory {}: {e}",
                self.sessions_dir.display()
            ))
        })?;

        let mut manifests = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().is_ok_and(|ft| ft.is_dir()) {
                continue;
            }
            let path = entry.path().join(MANIFEST_FILE);
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|json| {
                    serde_json::from_str::<SessionManifest>(&json).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(m) => manifests.push(m),
                Err(e) => warn!("Skipping session at {}: {e}", entry.path().display()),
            }
        }
        manifests.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(manifests)
    }

    /// Delete a session directory. Deleting an unknown session is a no-op.
    pub fn delete_session(&self, session_id: &str) -> Result<(), ChatError> {
        validate_session_id(session_id)?;
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| ChatError::write(session_id, e))?;
        }
        Ok(())
    }

    /// Atomic write: serialize to a temp file, then rename into place.
    fn save_manifest(&self, manifest: &SessionManifest) -> Result<(), ChatError> {
        let id = &manifest.session_id;
        let dir = self.session_dir(id);
        let tmp_path = dir.join(".manifest.json.tmp");
        let json = serde_json::to_string_pretty(manifest).map_err(|e| ChatError::write(id, e))?;
        fs::write(&tmp_path, json).map_err(|e| ChatError::write(id, e))?;
        fs::rename(&tmp_path, dir.join(MANIFEST_FILE)).map_err(|e| ChatError::write(id, e))
    }
}

impl SessionStore for FileStore {
    fn load(&self, session_id: &str) -> Result<Conversation, ChatError> {
        validate_session_id(session_id)?;
        let path = self.session_dir(session_id).join(MESSAGES_FILE);
        if !path.exists() {
            debug!("No stored history for session {session_id}");
            return Ok(Conversation::new(session_id));
        }

        let file = fs::File::open(&path).map_err(|e| ChatError::load(session_id, e))?;
        let mut messages = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| ChatError::load(session_id, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let message: Message = serde_json::from_str(&line).map_err(|e| {
                ChatError::load(session_id, format!("{MESSAGES_FILE} line {}: {e}", n + 1))
            })?;
            messages.push(message);
        }
        debug!("Loaded {} message(s) for session {session_id}", messages.len());

        Conversation::from_messages(session_id, messages)
            .map_err(|e| ChatError::load(session_id, e))
    }

    fn append(&self, session_id: &str, message: &Message) -> Result<(), ChatError> {
        validate_session_id(session_id).map_err(|e| ChatError::write(session_id, e))?;
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).map_err(|e| ChatError::write(session_id, e))?;

        let now = Utc::now();
        let mut manifest = match self.manifest(session_id) {
            Ok(Some(manifest)) => manifest,
            Ok(None) => SessionManifest::empty(session_id, now),
            Err(e) => {
                warn!("Rebuilding manifest for session {session_id}: {e}");
                self.rebuild_manifest(session_id, now)
            }
        };

        let mut line = serde_json::to_string(message).map_err(|e| ChatError::write(session_id, e))?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(MESSAGES_FILE))
            .map_err(|e| ChatError::write(session_id, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| ChatError::write(session_id, e))?;

        manifest.updated_at = now;
        manifest.message_count += 1;
        if manifest.preview.is_empty() && message.role == MessageRole::User {
            manifest.preview = preview_of(message);
        }
        self.save_manifest(&manifest)
    }
}

impl FileStore {
    /// Recount a session's manifest from `messages.jsonl`. The original
    /// creation time is lost; unparseable lines still count.
    fn rebuild_manifest(&self, session_id: &str, now: DateTime<Utc>) -> SessionManifest {
        let mut manifest = SessionManifest::empty(session_id, now);
        let Ok(file) = fs::File::open(self.session_dir(session_id).join(MESSAGES_FILE)) else {
            return manifest;
        };
        for line in BufReader::new(file).lines().map_while(Result::ok) {
            if line.trim().is_empty() {
                continue;
            }
            manifest.message_count += 1;
            if manifest.preview.is_empty()
                && let Ok(message) = serde_json::from_str::<Message>(&line)
                && message.role == MessageRole::User
            {
                manifest.preview = preview_of(&message);
            }
        }
        manifest
    }
}

fn preview_of(message: &Message) -> String {
    message.text().chars().take(200).collect()
}
