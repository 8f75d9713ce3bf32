//! Conversation sessions and their persistence.
//!
//! A [`Session`] is the ordered message history plus bookkeeping metadata
//! (model, cumulative cost as a decimal, cumulative token usage, turn
//! count). The run loop appends messages in strict order: the initial user
//! prompt, then alternating assistant responses and user messages carrying
//! tool results.
//!
//! Stores deep-copy on save and load, so caller mutations never leak into
//! persisted state. The on-disk format is one JSON file per session:
//!
//! ```json
//! {
//!   "id": "sess_20260731T120000_9f2c4e6a8b0d1f3a",
//!   "messages": [ ... ],
//!   "metadata": {
//!     "model": "claude-opus-4-6",
//!     "total_cost": "0.0175",
//!     "total_tokens": { "InputTokens": 10, "OutputTokens": 5,
//!                       "CacheReadInputTokens": 0, "CacheCreationInputTokens": 0 },
//!     "num_turns": 1
//!   },
//!   "created_at": "2026-07-31T12:00:00Z",
//!   "updated_at": "2026-07-31T12:00:02Z"
//! }
//! ```

use crate::types::{Message, TokenUsage};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Identifier prefix for sessions.
pub const SESSION_PREFIX: &str = "sess";
/// Identifier prefix for agents.
pub const AGENT_PREFIX: &str = "agt";
/// Identifier prefix for runs.
pub const RUN_PREFIX: &str = "run";
/// Identifier prefix for teams of agents.
pub const TEAM_PREFIX: &str = "team";

/// Generates an identifier of the form
/// `{prefix}_{UTC YYYYMMDDTHHMMSS}_{16 hex chars}`.
///
/// The suffix comes from the thread-local CSPRNG.
pub fn generate_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S");
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}_{timestamp}_{suffix}")
}

/// Bookkeeping carried alongside the message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    /// Model the session ran against.
    pub model: String,
    /// Cumulative cost in USD, serialized as a decimal string.
    pub total_cost: Decimal,
    /// Cumulative token usage.
    pub total_tokens: TokenUsage,
    /// Turns consumed so far.
    pub num_turns: u32,
}

impl SessionMetadata {
    fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            total_cost: Decimal::ZERO,
            total_tokens: TokenUsage::default(),
            num_turns: 0,
        }
    }
}

/// An ordered conversation history with metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Stable identifier, `sess_`-prefixed.
    pub id: String,
    /// The conversation, oldest first.
    pub messages: Vec<Message>,
    /// Cost/usage/turn bookkeeping.
    pub metadata: SessionMetadata,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an empty session for a model.
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(SESSION_PREFIX),
            messages: Vec::new(),
            metadata: SessionMetadata::new(model),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a message and bumps `updated_at`.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Deep-copies the session under a fresh identifier. The clone's
    /// message list is independent under mutation of either side.
    pub fn fork(&self) -> Session {
        let now = Utc::now();
        Session {
            id: generate_id(SESSION_PREFIX),
            messages: self.messages.clone(),
            metadata: self.metadata.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Append-only persistence for sessions.
///
/// Implementations deep-copy on save and load; mutating a session after
/// saving it must not change the stored copy.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a session, replacing any previous version.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Loads a session by id.
    async fn load(&self, id: &str) -> Result<Session>;

    /// Lists all readable sessions.
    async fn list(&self) -> Result<Vec<Session>>;

    /// Deletes a session by id.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory store, mainly for tests and ephemeral agents.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .expect("memory store lock poisoned")
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Session> {
        self.sessions
            .read()
            .expect("memory store lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| Error::other(format!("session not found: {id}")))
    }

    async fn list(&self) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .read()
            .expect("memory store lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions
            .write()
            .expect("memory store lock poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::other(format!("session not found: {id}")))
    }
}

/// One-file-per-session JSON store.
///
/// The directory is created with mode 0755, files are written 0644.
/// `list` skips non-`.json` entries and files that fail to parse.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::other(format!("failed to create session dir: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755));
        }
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn save(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.id);
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| Error::other(format!("failed to write session file: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644));
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Session> {
        let path = self.path_for(id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::other(format!("session not found: {id}: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn list(&self) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::other(format!("failed to read session dir: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::other(format!("failed to read session dir: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            // Unparseable files are skipped, not fatal.
            if let Ok(session) = serde_json::from_slice::<Session>(&bytes) {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        tokio::fs::remove_file(self.path_for(id))
            .await
            .map_err(|e| Error::other(format!("session not found: {id}: {e}")))
    }
}
