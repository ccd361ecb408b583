//! Session management endpoints.
//!
//! All routes act on the sessions of the authenticated caller.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use parley_session::{Session, SessionValidationResult};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Body for session issuance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueSessionRequest {
    /// Application state stored with the session.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A session as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            user_id: session.user_id,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

/// Response for listing sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionResponse>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions - Issue a session for the caller.
pub async fn issue_session_handler(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<Json<IssueSessionRequest>>,
) -> Result<(StatusCode, Json<SessionResponse>), ServerError> {
    if state.users.find(&user.user_id).is_none() {
        return Err(ServerError::NotFound("User not found".to_string()));
    }

    let payload = body.map(|Json(b)| b.payload).unwrap_or_default();
    let session = state.sessions.issue(&user.user_id, payload).await?;

    Ok((StatusCode::CREATED, Json(session.into())))
}

/// GET /api/v1/sessions - List the caller's live sessions.
pub async fn list_sessions_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ListSessionsResponse>, ServerError> {
    let sessions = state.sessions.list(&user.user_id).await?;
    Ok(Json(ListSessionsResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/v1/sessions/{id} - Validate a session for the caller.
pub async fn validate_session_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<SessionValidationResult>, ServerError> {
    let result = state.sessions.validate(&user.user_id, &session_id).await?;
    Ok(Json(result))
}

/// POST /api/v1/sessions/{id}/renew - Extend a live session.
pub async fn renew_session_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ServerError> {
    match state.sessions.renew(&user.user_id, &session_id).await? {
        Some(session) => Ok(Json(session.into())),
        None => Err(ServerError::NotFound(format!(
            "Session {} not found",
            session_id
        ))),
    }
}

/// DELETE /api/v1/sessions/{id} - Log out of one session.
///
/// Best effort: store failures are logged and the caller still sees 204.
pub async fn delete_session_handler(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> StatusCode {
    if let Err(e) = state.sessions.revoke(&user.user_id, &session_id).await {
        tracing::warn!(
            user_id = %user.user_id,
            session_id = %session_id,
            error = %e,
            "Logout failed"
        );
    }
    StatusCode::NO_CONTENT
}

/// DELETE /api/v1/sessions - Log out everywhere.
pub async fn delete_all_sessions_handler(
    State(state): State<AppState>,
    user: AuthUser,
) -> StatusCode {
    state.sessions.revoke_all(&user.user_id).await;
    StatusCode::NO_CONTENT
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
