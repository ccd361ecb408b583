//! The session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-issued login session.
///
/// Serialized as camelCase JSON so records stay readable by every service
/// sharing the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Globally unique, opaque identifier.
    pub session_id: String,

    /// Owner of the session.
    pub user_id: String,

    /// When the session was issued.
    pub created_at: DateTime<Utc>,

    /// The session is findable only while `now < expires_at`.
    pub expires_at: DateTime<Utc>,

    /// Application session state.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Session {
    /// Create a session with an explicit id.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            created_at,
            expires_at,
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Whether the session has lapsed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the session belongs to `user_id`.
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
