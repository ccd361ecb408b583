//! Session issuance, renewal, validation and logout.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parley_store::SharedClock;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::session::Session;
use crate::store::SharedSessionStore;
use crate::ttl::MAX_SESSION_TTL;

/// Outcome of checking a session against a claimed identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionValidationResult {
    pub valid: bool,
    pub message: String,
}

impl SessionValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: "Session is valid".to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Session flows over a [`SessionStore`](crate::SessionStore).
#[derive(Clone)]
pub struct SessionService {
    store: SharedSessionStore,
    clock: SharedClock,
    ttl: Duration,
}

impl SessionService {
    /// Create a service issuing sessions that live for `ttl`, capped at
    /// [`MAX_SESSION_TTL`].
    pub fn new(store: SharedSessionStore, clock: SharedClock, ttl: Duration) -> Self {
        if ttl > MAX_SESSION_TTL {
            warn!(
                ttl_secs = ttl.as_secs(),
                max_secs = MAX_SESSION_TTL.as_secs(),
                "Session lifetime capped"
            );
        }
        Self {
            store,
            clock,
            ttl: ttl.min(MAX_SESSION_TTL),
        }
    }

    /// Lifetime given to issued and renewed sessions.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Expiry for a session (re)started at `now`.
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        ChronoDuration::from_std(self.ttl)
            .ok()
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Issue a new session for `user_id`.
    pub async fn issue(&self, user_id: &str, payload: serde_json::Value) -> Result<Session> {
        let now = self.clock.now();
        let session = Session::new(
            Uuid::new_v4().to_string(),
            user_id,
            now,
            self.expiry_from(now),
        )
        .with_payload(payload);

        let session = self.store.save(session).await?;
        info!(user_id = %user_id, session_id = %session.session_id, "Session issued");
        Ok(session)
    }

    /// Extend a live session by one lifetime from now.
    ///
    /// Returns `None` when the session is absent, expired or owned by someone else.
    pub async fn renew(&self, user_id: &str, session_id: &str) -> Result<Option<Session>> {
        let now = self.clock.now();
        let Some(mut session) = self.store.find_by_session_id(session_id).await? else {
            return Ok(None);
        };
        if !session.is_owned_by(user_id) || session.is_expired_at(now) {
            return Ok(None);
        }

        session.expires_at = self.expiry_from(now);
        let session = self.store.save(session).await?;
        debug!(user_id = %user_id, session_id = %session_id, expires_at = %session.expires_at, "Session renewed");
        Ok(Some(session))
    }

    /// Check that `session_id` is live and belongs to `user_id`.
    ///
    /// A record that cannot be decoded is deleted and reported invalid.
    /// Store failures are returned as errors so the caller can retry.
    pub async fn validate(&self, user_id: &str, session_id: &str) -> Result<SessionValidationResult> {
        let session = match self.store.find_by_session_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(SessionValidationResult::invalid("Session not found")),
            Err(SessionError::Serialization(e)) => {
                warn!(user_id = %user_id, session_id = %session_id, error = %e, "Invalidating corrupt session");
                if let Err(e) = self.store.delete(user_id, session_id).await {
                    warn!(session_id = %session_id, error = %e, "Failed to remove corrupt session");
                }
                return Ok(SessionValidationResult::invalid("Session data corrupted"));
            }
            Err(e) => return Err(e),
        };

        if !session.is_owned_by(user_id) {
            return Ok(SessionValidationResult::invalid(
                "Session does not belong to user",
            ));
        }
        if session.is_expired_at(self.clock.now()) {
            return Ok(SessionValidationResult::invalid("Session expired"));
        }
        Ok(SessionValidationResult::valid())
    }

    /// Sessions currently held by `user_id`.
    pub async fn list(&self, user_id: &str) -> Result<Vec<Session>> {
        self.store.find_by_user_id(user_id).await
    }

    /// Log out of one session.
    ///
    /// Only the owner can revoke a session; an absent or foreign session is
    /// left alone. A record that cannot be decoded is removed.
    pub async fn revoke(&self, user_id: &str, session_id: &str) -> Result<()> {
        match self.store.find_by_session_id(session_id).await {
            Ok(Some(session)) if session.is_owned_by(user_id) => {}
            Ok(Some(_)) => {
                warn!(user_id = %user_id, session_id = %session_id, "Refusing to revoke another user's session");
                return Ok(());
            }
            Ok(None) => {
                debug!(user_id = %user_id, session_id = %session_id, "Nothing to revoke");
                return Ok(());
            }
            Err(SessionError::Serialization(e)) => {
                warn!(user_id = %user_id, session_id = %session_id, error = %e, "Revoking corrupt session");
            }
            Err(e) => return Err(e),
        }

        self.store.delete(user_id, session_id).await?;
        info!(user_id = %user_id, session_id = %session_id, "Session revoked");
        Ok(())
    }

    /// Sweep expired sessions from backends that keep them past expiry.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired().await
    }

    /// Log out everywhere. Never fails.
    pub async fn revoke_all(&self, user_id: &str) {
        match self.store.delete_all(user_id).await {
            Ok(()) => info!(user_id = %user_id, "All sessions revoked"),
            Err(e) => warn!(user_id = %user_id, error = %e, "Logout-everywhere incomplete"),
        }
    }
}
