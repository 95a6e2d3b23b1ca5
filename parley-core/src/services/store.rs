// src/services/store.rs
//! Conversation persistence.
//!
//! `SqliteTurnStore` follows the single-writer layout: one connection (WAL)
//! behind a mutex, with every statement run on the blocking pool so async
//! callers never hold the lock across an await.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::services::language::Locale;

/// One user message paired with the response it received. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub turn_id: Uuid,
    pub identity: String,
    pub user_text: String,
    pub response_text: String,
    pub locale: Locale,
    pub created_at: DateTime<Utc>,
    /// The response is the localized fallback, not backend output.
    pub fallback: bool,
}

#[async_trait]
pub trait TurnStore: Send + Sync {
    async fn append(&self, turn: ConversationTurn) -> Result<(), StoreError>;

    /// Up to `limit` turns for `identity`, most recent last.
    async fn list_recent(&self, identity: &str, limit: usize) -> Result<Vec<ConversationTurn>, StoreError>;

    /// Remove every turn for `identity`; returns how many were removed.
    async fn clear(&self, identity: &str) -> Result<usize, StoreError>;
}

pub struct SqliteTurnStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTurnStore {
    /// Open/create the database at `db_path`, creating parent directories.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating store dir {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("opening turn store {}", db_path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS turns (
              turn_id       TEXT PRIMARY KEY,
              identity      TEXT NOT NULL,
              user_text     TEXT NOT NULL,
              response_text TEXT NOT NULL,
              locale        TEXT NOT NULL,   -- "de" | "en"
              fallback      INTEGER NOT NULL,
              created_at    TEXT NOT NULL    -- RFC3339 UTC, microseconds
            );

            CREATE INDEX IF NOT EXISTS idx_turns_identity ON turns(identity, created_at);
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl TurnStore for SqliteTurnStore {
    async fn append(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        self.run(move |db| {
            db.execute(
                r#"
                INSERT INTO turns(turn_id, identity, user_text, response_text, locale, fallback, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                (
                    turn.turn_id.to_string(),
                    &turn.identity,
                    &turn.user_text,
                    &turn.response_text,
                    turn.locale.code(),
                    turn.fallback,
                    turn.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ),
            )?;
            Ok(())
        })
        .await
    }

    async fn list_recent(&self, identity: &str, limit: usize) -> Result<Vec<ConversationTurn>, StoreError> {
        let identity = identity.to_string();
        self.run(move |db| {
            let mut stmt = db.prepare(
                r#"
                SELECT turn_id, user_text, response_text, locale, fallback, created_at
                FROM turns
                WHERE identity = ?1
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?2
                "#,
            )?;
            let rows = stmt.query_map((&identity, limit as i64), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (turn_id, user_text, response_text, locale, fallback, created_at) = row?;
                out.push(ConversationTurn {
                    turn_id: Uuid::parse_str(&turn_id)
                        .map_err(|e| StoreError::Corrupt(format!("turn_id {}: {}", turn_id, e)))?,
                    identity: identity.clone(),
                    user_text,
                    response_text,
                    locale: Locale::from_code(&locale)
                        .ok_or_else(|| StoreError::Corrupt(format!("locale {}", locale)))?,
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|e| StoreError::Corrupt(format!("created_at {}: {}", created_at, e)))?
                        .with_timezone(&Utc),
                    fallback,
                });
            }
            out.reverse();
            Ok(out)
        })
        .await
    }

    async fn clear(&self, identity: &str) -> Result<usize, StoreError> {
        let identity = identity.to_string();
        self.run(move |db| Ok(db.execute("DELETE FROM turns WHERE identity = ?1", [&identity])?))
            .await
    }
}

/// Process-local store for tests and the echo agent.
#[derive(Debug, Default)]
pub struct MemoryTurnStore {
    turns: tokio::sync::Mutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryTurnStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.turns.lock().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn append(&self, turn: ConversationTurn) -> Result<(), StoreError> {
        self.turns
            .lock()
            .await
            .entry(turn.identity.clone())
            .or_default()
            .push(turn);
        Ok(())
    }

    async fn list_recent(&self, identity: &str, limit: usize) -> Result<Vec<ConversationTurn>, StoreError> {
        let turns = self.turns.lock().await;
        let all = turns.get(identity).map(Vec::as_slice).unwrap_or_default();
        Ok(all[all.len().saturating_sub(limit)..].to_vec())
    }

    async fn clear(&self, identity: &str) -> Result<usize, StoreError> {
        Ok(self
            .turns
            .lock()
            .await
            .remove(identity)
            .map(|v| v.len())
            .unwrap_or(0))
    }
}
