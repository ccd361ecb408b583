//! The session store interface.
//!
//! Both backends implement [`SessionStore`]; callers hold a
//! [`SharedSessionStore`] and never know which one is behind it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::session::Session;

/// Shared handle to the process's session store.
pub type SharedSessionStore = Arc<dyn SessionStore>;

/// Storage for login sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Insert or overwrite the session keyed by its id.
    ///
    /// Returns only once the write is confirmed readable; a committed but
    /// unconfirmed write is an error.
    async fn save(&self, session: Session) -> Result<Session>;

    /// Look a session up. Absent and expired sessions are `Ok(None)`.
    async fn find_by_session_id(&self, session_id: &str) -> Result<Option<Session>>;

    /// Live sessions owned by `user_id`. Stale index entries are skipped.
    async fn find_by_user_id(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Remove one session. Removing an absent session succeeds.
    async fn delete(&self, user_id: &str, session_id: &str) -> Result<()>;

    /// Remove every session owned by `user_id`.
    ///
    /// Failures on individual sessions are logged, not returned. An error
    /// means the sessions could not even be enumerated.
    async fn delete_all(&self, user_id: &str) -> Result<()>;

    /// Physically remove expired sessions, returning how many were removed.
    ///
    /// Backends whose records expire on their own leave this as a no-op.
    async fn purge_expired(&self) -> Result<usize> {
        Ok(0)
    }
}
