//! Session store atop the shared key-value backing store.
//!
//! Layout:
//! - `session:session:{id}` holds the JSON record, with a TTL tracking `expires_at`
//! - `session:user:{user}` is the set of ids owned by a user, without TTL
//!
//! The index can briefly name ids whose record has expired or was deleted by a
//! half-finished `delete`. Enumeration checks each id against its record and
//! prunes the ones that are gone.
//!
//! The TTL floor can keep a record readable past `expires_at`, so reads also
//! check expiry against the clock.

use async_trait::async_trait;
use parley_store::{SharedClock, SharedStore, WriteBatch};
use tracing::{debug, error, warn};

use crate::config::ReadConsistency;
use crate::error::{Result, SessionError};
use crate::keys;
use crate::session::Session;
use crate::store::SessionStore;
use crate::ttl::remaining_ttl;

/// [`SessionStore`] over a [`KeyValueStore`](parley_store::KeyValueStore).
pub struct DistributedSessionStore {
    kv: SharedStore,
    clock: SharedClock,
    consistency: ReadConsistency,
}

impl DistributedSessionStore {
    /// Create a store assuming eventually consistent reads.
    pub fn new(kv: SharedStore, clock: SharedClock) -> Self {
        Self {
            kv,
            clock,
            consistency: ReadConsistency::default(),
        }
    }

    /// Set the read consistency of the backing store.
    pub fn with_consistency(mut self, consistency: ReadConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Confirm a committed record is readable.
    ///
    /// Performs at most one retry; never loops.
    async fn confirm_visible(&self, key: &str) -> Result<()> {
        if self.kv.get(key).await?.is_some() {
            return Ok(());
        }

        if let ReadConsistency::Eventual { retry_delay } = self.consistency {
            debug!(key = %key, delay_ms = retry_delay.as_millis() as u64, "Committed session not yet visible, re-reading once");
            tokio::time::sleep(retry_delay).await;
            if self.kv.get(key).await?.is_some() {
                return Ok(());
            }
        }

        error!(key = %key, "Committed session never became visible");
        Err(SessionError::StoreUnavailable(format!(
            "session record {} not visible after commit",
            key
        )))
    }

    fn decode(raw: &str) -> Result<Session> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[async_trait]
impl SessionStore for DistributedSessionStore {
    fn backend_name(&self) -> &'static str {
        "distributed"
    }

    async fn save(&self, session: Session) -> Result<Session> {
        let record = serde_json::to_string(&session)?;
        let ttl = remaining_ttl(session.expires_at, self.clock.now());
        let record_key = keys::session(&session.session_id);

        // Record, TTL and index membership land together or not at all, so no
        // reader sees the id indexed while its record is missing.
        let batch = WriteBatch::new()
            .set(&record_key, record)
            .expire(&record_key, ttl)
            .set_add(keys::user_sessions(&session.user_id), &session.session_id);
        self.kv.execute(&batch).await?;

        self.confirm_visible(&record_key).await?;

        debug!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            ttl_ms = ttl.as_millis() as u64,
            "Session saved"
        );
        Ok(session)
    }

    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Session>> {
        let Some(raw) = self.kv.get(&keys::session(session_id)).await? else {
            return Ok(None);
        };
        let session = Self::decode(&raw)?;
        if session.is_expired_at(self.clock.now()) {
            debug!(session_id = %session_id, "Record outlived its expiry, treating as absent");
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Session>> {
        let index_key = keys::user_sessions(user_id);
        let ids = self.kv.set_members(&index_key).await?;

        let now = self.clock.now();
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.kv.get(&keys::session(&id)).await? {
                Some(raw) => match Self::decode(&raw) {
                    Ok(session) if session.is_expired_at(now) => {}
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        warn!(user_id = %user_id, session_id = %id, error = %e, "Skipping unreadable session");
                    }
                },
                None => {
                    debug!(user_id = %user_id, session_id = %id, "Pruning stale index entry");
                    if let Err(e) = self.kv.set_remove(&index_key, &id).await {
                        warn!(user_id = %user_id, session_id = %id, error = %e, "Failed to prune stale index entry");
                    }
                }
            }
        }

        Ok(sessions)
    }

    async fn delete(&self, user_id: &str, session_id: &str) -> Result<()> {
        self.kv.delete(&keys::session(session_id)).await?;

        // Not transactional with the record delete: a leftover index entry is
        // filtered out at enumeration.
        if let Err(e) = self
            .kv
            .set_remove(&keys::user_sessions(user_id), session_id)
            .await
        {
            warn!(user_id = %user_id, session_id = %session_id, error = %e, "Session removed but index entry left behind");
        }

        debug!(user_id = %user_id, session_id = %session_id, "Session deleted");
        Ok(())
    }

    async fn delete_all(&self, user_id: &str) -> Result<()> {
        let index_key = keys::user_sessions(user_id);
        let ids = self.kv.set_members(&index_key).await?;

        let mut failed = 0usize;
        for id in &ids {
            if let Err(e) = self.kv.delete(&keys::session(id)).await {
                failed += 1;
                warn!(user_id = %user_id, session_id = %id, error = %e, "Failed to delete session");
            }
        }

        if let Err(e) = self.kv.delete(&index_key).await {
            warn!(user_id = %user_id, error = %e, "Failed to delete session index");
        }

        if failed > 0 {
            warn!(user_id = %user_id, failed, total = ids.len(), "Partial failure deleting user sessions");
        } else {
            debug!(user_id = %user_id, count = ids.len(), "Deleted all user sessions");
        }
        Ok(())
    }
}
