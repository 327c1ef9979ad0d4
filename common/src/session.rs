//! Conversation session store (C13): a bounded, persistent message history
//! per session id, used by the chat and RAG endpoints to carry context
//! across turns.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{self, Any};
use surrealdb::Surreal;
use uuid::Uuid;

use crate::error::Result;

/// Most recent messages retained per session; older turns are evicted FIFO.
pub const MAX_HISTORY_MESSAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Either embedded-persistent (survives restarts) or purely in-memory
/// (cleared on process exit), selected by `session_storage_mode`.
pub struct SessionStore {
    client: Surreal<Any>,
}

impl SessionStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let address = format!("surrealkv://{}", path.display());
        let client = any::connect(address).await?;
        client.use_ns("engine").use_db("sessions").await?;
        let store = Self { client };
        store.ensure_initialized().await?;
        Ok(store)
    }

    pub async fn memory() -> Result<Self> {
        let client = any::connect("mem://").await?;
        client.use_ns("engine").use_db("sessions").await?;
        let store = Self { client };
        store.ensure_initialized().await?;
        Ok(store)
    }

    async fn ensure_initialized(&self) -> Result<()> {
        self.client
            .query(
                "
                DEFINE TABLE IF NOT EXISTS session SCHEMAFULL;
                DEFINE FIELD IF NOT EXISTS session_id ON session TYPE string;
                DEFINE FIELD IF NOT EXISTS created_at ON session TYPE datetime;
                DEFINE FIELD IF NOT EXISTS last_accessed ON session TYPE datetime;
                DEFINE INDEX IF NOT EXISTS idx_session_id ON session FIELDS session_id UNIQUE;

                DEFINE TABLE IF NOT EXISTS session_message SCHEMAFULL;
                DEFINE FIELD IF NOT EXISTS session_id ON session_message TYPE string;
                DEFINE FIELD IF NOT EXISTS role ON session_message TYPE string;
                DEFINE FIELD IF NOT EXISTS content ON session_message TYPE string;
                DEFINE FIELD IF NOT EXISTS created_at ON session_message TYPE datetime;
                DEFINE INDEX IF NOT EXISTS idx_session_message_session_id ON session_message FIELDS session_id;
                ",
            )
            .await?
            .check()?;
        Ok(())
    }

    /// Creates a new session (if `id` is `None`, a fresh UUID is minted) and
    /// returns its id. Calling with an existing id is a no-op touch.
    pub async fn create(&self, id: Option<String>) -> Result<String> {
        let session_id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = Utc::now();

        let mut response = self
            .client
            .query("UPDATE session SET last_accessed = $now WHERE session_id = $id RETURN AFTER")
            .bind(("now", now))
            .bind(("id", session_id.clone()))
            .await?
            .check()?;
        let updated: Vec<serde_json::Value> = response.take(0)?;

        if updated.is_empty() {
            self.client
                .query("CREATE session SET session_id = $id, created_at = $now, last_accessed = $now")
                .bind(("id", session_id.clone()))
                .bind(("now", now))
                .await?
                .check()?;
        }

        Ok(session_id)
    }

    /// Appends a message, touches `last_accessed`, then trims history to the
    /// most recent [`MAX_HISTORY_MESSAGES`] entries (oldest evicted first).
    pub async fn append(&self, session_id: &str, role: MessageRole, content: &str) -> Result<()> {
        self.create(Some(session_id.to_string())).await?;
        let now = Utc::now();

        self.client
            .query(
                "CREATE session_message SET session_id = $id, role = $role, content = $content, created_at = $now",
            )
            .bind(("id", session_id.to_string()))
            .bind(("role", role.as_str().to_string()))
            .bind(("content", content.to_string()))
            .bind(("now", now))
            .await?
            .check()?;

        self.client
            .query("UPDATE session SET last_accessed = $now WHERE session_id = $id")
            .bind(("now", now))
            .bind(("id", session_id.to_string()))
            .await?
            .check()?;

        self.trim(session_id).await
    }

    async fn trim(&self, session_id: &str) -> Result<()> {
        let history = self.history(session_id).await?;
        if history.len() <= MAX_HISTORY_MESSAGES {
            return Ok(());
        }
        let overflow = history.len() - MAX_HISTORY_MESSAGES;
        let cutoff = history[overflow - 1].created_at;

        self.client
            .query("DELETE session_message WHERE session_id = $id AND created_at <= $cutoff")
            .bind(("id", session_id.to_string()))
            .bind(("cutoff", cutoff))
            .await?
            .check()?;
        Ok(())
    }

    /// Full retained history, oldest first.
    pub async fn history(&self, session_id: &str) -> Result<Vec<SessionMessage>> {
        let mut response = self
            .client
            .query("SELECT role, content, created_at FROM session_message WHERE session_id = $id ORDER BY created_at ASC")
            .bind(("id", session_id.to_string()))
            .await?
            .check()?;
        Ok(response.take(0)?)
    }

    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.client
            .query("DELETE session_message WHERE session_id = $id; DELETE session WHERE session_id = $id;")
            .bind(("id", session_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    /// Deletes every session (and its messages) whose `last_accessed` is
    /// older than `ttl`.
    pub async fn cleanup_expired(&self, ttl: Duration) -> Result<usize> {
        let cutoff = Utc::now() - ttl;

        #[derive(Deserialize)]
        struct Row {
            session_id: String,
        }
        let mut response = self
            .client
            .query("SELECT session_id FROM session WHERE last_accessed < $cutoff")
            .bind(("cutoff", cutoff))
            .await?
            .check()?;
        let expired: Vec<Row> = response.take(0)?;

        for row in &expired {
            self.clear(&row.session_id).await?;
        }
        Ok(expired.len())
    }
}
