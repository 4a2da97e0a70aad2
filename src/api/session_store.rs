//! Session persistence: the checkpoint that carries a conversation across
//! the approval suspension boundary.
//!
//! The suspended state must survive arbitrarily long waits, so the store is
//! written on every state change and the SQLite backend keeps sessions
//! across restarts. A session row is small: identity, state, and the full
//! serialized conversation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Conversation;
use crate::config::{Config, SessionStoreKind};

/// Where a session currently stands in the gated cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for the next user message.
    Idle,

    /// Suspended on a proposed tool call, waiting for a decision.
    AwaitingApproval,

    /// A host-provided action was proposed; the caller's surface must post
    /// its result before the conversation continues.
    AwaitingHostAction,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingApproval => "awaiting_approval",
            Self::AwaitingHostAction => "awaiting_host_action",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "idle" => Some(Self::Idle),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "awaiting_host_action" => Some(Self::AwaitingHostAction),
            _ => None,
        }
    }
}

/// One persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub conversation: Conversation,
    pub created_at: String,
    pub updated_at: String,
}

impl Session {
    pub fn new() -> Self {
        let now = now_string();
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            conversation: Conversation::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_string();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub fn now_string() -> String {
    Utc::now().to_rfc3339()
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    fn is_persistent(&self) -> bool;

    async fn list_sessions(&self) -> Result<Vec<Session>, String>;

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, String>;

    /// Insert or replace the session as given.
    async fn save_session(&self, session: &Session) -> Result<(), String>;

    async fn delete_session(&self, id: Uuid) -> Result<bool, String>;
}

/// Build the configured store, falling back to memory when the SQLite file
/// cannot be opened.
pub fn create_session_store(config: &Config) -> Arc<dyn SessionStore> {
    match config.store_kind {
        SessionStoreKind::Memory => {
            info!("Using in-memory session store");
            Arc::new(InMemorySessionStore::new())
        }
        SessionStoreKind::Sqlite => match SqliteSessionStore::open(&config.session_db_path) {
            Ok(store) => {
                info!(path = %config.session_db_path.display(), "Using SQLite session store");
                Arc::new(store)
            }
            Err(e) => {
                warn!("Falling back to in-memory session store: {}", e);
                Arc::new(InMemorySessionStore::new())
            }
        },
    }
}

/// Non-persistent store for tests and degraded startup.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn is_persistent(&self) -> bool {
        false
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, String> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, String> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn save_session(&self, session: &Session) -> Result<(), String> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, String> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }
}

/// SQLite-backed store. Row operations are short; the connection sits behind
/// an async mutex rather than a blocking pool.
pub struct SqliteSessionStore {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self, String> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("create session db directory: {}", e))?;
            }
        }

        let conn = rusqlite::Connection::open(path)
            .map_err(|e| format!("open session db at {}: {}", path.display(), e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                conversation TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| format!("initialize session schema: {}", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_session(
    (id, state, conversation, created_at, updated_at): (String, String, String, String, String),
) -> Result<Session, String> {
    Ok(Session {
        id: Uuid::parse_str(&id).map_err(|e| format!("invalid session id {}: {}", id, e))?,
        state: SessionState::parse(&state)
            .ok_or_else(|| format!("invalid session state: {}", state))?,
        conversation: serde_json::from_str(&conversation)
            .map_err(|e| format!("decode conversation: {}", e))?,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, String> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT id, state, conversation, created_at, updated_at
                 FROM sessions ORDER BY updated_at DESC",
            )
            .map_err(|e| format!("prepare list: {}", e))?;

        let rows = stmt
            .query_map([], row_to_session)
            .map_err(|e| format!("query sessions: {}", e))?;

        let mut sessions = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| format!("read session row: {}", e))?;
            sessions.push(decode_session(raw)?);
        }
        Ok(sessions)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, String> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                "SELECT id, state, conversation, created_at, updated_at
                 FROM sessions WHERE id = ?1",
                [id.to_string()],
                row_to_session,
            )
            .optional()
            .map_err(|e| format!("query session: {}", e))?;

        raw.map(decode_session).transpose()
    }

    async fn save_session(&self, session: &Session) -> Result<(), String> {
        let conversation = serde_json::to_string(&session.conversation)
            .map_err(|e| format!("encode conversation: {}", e))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, state, conversation, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                conversation = excluded.conversation,
                updated_at = excluded.updated_at",
            rusqlite::params![
                session.id.to_string(),
                session.state.as_str(),
                conversation,
                session.created_at,
                session.updated_at,
            ],
        )
        .map_err(|e| format!("save session: {}", e))?;
        Ok(())
    }

    async fn delete_session(&self, id: Uuid) -> Result<bool, String> {
        let conn = self.conn.lock().await;
        let changed = conn
            .execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])
            .map_err(|e| format!("delete session: {}", e))?;
        Ok(changed > 0)
    }
}
