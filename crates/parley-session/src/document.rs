//! Session store over a SQLite document table.
//!
//! One row per session, keyed by id, with the owner and expiry pulled out
//! into indexed columns and the full record kept as a JSON document. Expired
//! rows may linger until [`SessionStore::purge_expired`] runs, so every
//! read applies the expiry check itself.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use parley_store::SharedClock;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::session::Session;
use crate::store::SessionStore;

/// Current schema version (stored in `PRAGMA user_version`).
const SCHEMA_VERSION: i32 = 1;

/// [`SessionStore`] over a SQLite table.
pub struct DocumentSessionStore {
    conn: Arc<Mutex<Connection>>,
    clock: SharedClock,
}

impl DocumentSessionStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::StoreUnavailable(format!(
                    "cannot create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::create_schema(&conn)?;

        info!(path = %path.display(), "Document session store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory(clock: SharedClock) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    fn create_schema(conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                document TEXT NOT NULL
            );

            -- Owner lookups for enumeration and logout-everywhere
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id
                ON sessions(user_id);

            -- Expiry sweeps
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at
                ON sessions(expires_at);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| SessionError::StoreUnavailable(format!("document store task failed: {}", e)))?
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl SessionStore for DocumentSessionStore {
    fn backend_name(&self) -> &'static str {
        "document"
    }

    async fn save(&self, session: Session) -> Result<Session> {
        let document = serde_json::to_string(&session)?;
        let session_id = session.session_id.clone();
        let user_id = session.user_id.clone();
        let expires_at = session.expires_at.timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, user_id, expires_at, document)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                     user_id = excluded.user_id,
                     expires_at = excluded.expires_at,
                     document = excluded.document",
                params![session_id, user_id, expires_at, document],
            )?;
            Ok(())
        })
        .await?;

        debug!(session_id = %session.session_id, user_id = %session.user_id, "Session saved");
        Ok(session)
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Session>> {
        let id = session_id.to_string();
        let row: Option<(String, i64)> = self
            .with_conn(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT document, expires_at FROM sessions WHERE session_id = ?1",
                        params![id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?)
            })
            .await?;

        let Some((document, expires_at)) = row else {
            return Ok(None);
        };

        if expires_at <= self.now_millis() {
            debug!(session_id = %session_id, "Session row present but expired");
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&document)?))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Session>> {
        let owner = user_id.to_string();
        let now = self.now_millis();
        let documents: Vec<(String, String)> = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT session_id, document FROM sessions
                     WHERE user_id = ?1 AND expires_at > ?2
                     ORDER BY expires_at",
                )?;
                let rows = stmt
                    .query_map(params![owner, now], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut sessions = Vec::with_capacity(documents.len());
        for (id, document) in documents {
            match serde_json::from_str(&document) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(user_id = %user_id, session_id = %id, error = %e, "Skipping unreadable session");
                }
            }
        }
        Ok(sessions)
    }

    async fn delete(&self, user_id: &str, session_id: &str) -> Result<()> {
        let owner = user_id.to_string();
        let id = session_id.to_string();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM sessions WHERE session_id = ?1 AND user_id = ?2",
                    params![id, owner],
                )?)
            })
            .await?;

        debug!(user_id = %user_id, session_id = %session_id, removed, "Session delete");
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        let owner = user_id.to_string();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM sessions WHERE user_id = ?1",
                    params![owner],
                )?)
            })
            .await?;

        debug!(user_id = %user_id, count = removed, "Deleted all user sessions");
        Ok(())
    }

    /// Physically remove rows whose expiry has passed. Returns the count removed.
    async fn purge_expired(&self) -> Result<usize> {
        let now = self.now_millis();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM sessions WHERE expires_at <= ?1",
                    params![now],
                )?)
            })
            .await?;

        if removed > 0 {
            debug!(count = removed, "Purged expired sessions");
        }
        Ok(removed)
    }
}
