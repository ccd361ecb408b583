//! WebSocket handshake admission.
//!
//! A client connects to `GET /ws?token=..&sessionId=..`. Before the upgrade
//! is accepted the server checks, in order:
//! 1. both parameters are present
//! 2. the token verifies
//! 3. the session is live and belongs to the token's user
//! 4. the user exists
//!
//! Rejections are plain HTTP responses carrying a JSON `{code, message}` body.
//! Admitted clients receive a `connected` message; beyond that the
//! connection only answers pings and closes.

use std::time::Duration;

use axum::{
    Json,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ErrorResponse;
use crate::state::AppState;
use crate::users::User;

/// Idle timeout for WebSocket connections (5 minutes).
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ─────────────────────────────────────────────────────────────────────────────
// Protocol Types
// ─────────────────────────────────────────────────────────────────────────────

/// Query parameters of the handshake request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    pub token: Option<String>,
    pub session_id: Option<String>,
}

/// Messages from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted.
    Connected {
        user_id: String,
        name: String,
        session_id: String,
    },
    /// Error occurred.
    Error { code: String, message: String },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Why a handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Missing token or sessionId")]
    MissingCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid session")]
    InvalidSession,
    #[error("User not found")]
    UserNotFound,
    /// Session store could not answer; the client may retry.
    #[error("Session store unavailable")]
    Unavailable,
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            HandshakeError::MissingCredentials => (StatusCode::BAD_REQUEST, "bad_request"),
            HandshakeError::InvalidToken | HandshakeError::InvalidSession => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            HandshakeError::UserNotFound => (StatusCode::NOT_FOUND, "not_found"),
            HandshakeError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// A client cleared to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub user: User,
    pub session_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handshake
// ─────────────────────────────────────────────────────────────────────────────

/// Decide whether a client presenting `params` may connect.
pub async fn admit(state: &AppState, params: &HandshakeParams) -> Result<Admission, HandshakeError> {
    let (Some(token), Some(session_id)) = (
        params.token.as_deref().filter(|t| !t.is_empty()),
        params.session_id.as_deref().filter(|s| !s.is_empty()),
    ) else {
        return Err(HandshakeError::MissingCredentials);
    };

    let user_id = state
        .verifier
        .verify(token)
        .map_err(|_| HandshakeError::InvalidToken)?;

    let validation = state
        .sessions
        .validate(&user_id, session_id)
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %user_id, session_id = %session_id, error = %e, "Handshake validation failed");
            HandshakeError::Unavailable
        })?;
    if !validation.valid {
        tracing::debug!(
            user_id = %user_id,
            session_id = %session_id,
            reason = %validation.message,
            "Handshake rejected"
        );
        return Err(HandshakeError::InvalidSession);
    }

    let user = state
        .users
        .find(&user_id)
        .ok_or(HandshakeError::UserNotFound)?;

    Ok(Admission {
        user,
        session_id: session_id.to_string(),
    })
}

/// GET /ws - WebSocket upgrade handler.
///
/// Credentials travel in the query string so browsers, which cannot set
/// headers on WebSocket requests, can connect.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<HandshakeParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let admission = match admit(&state, &params).await {
        Ok(admission) => admission,
        Err(e) => return e.into_response(),
    };

    match upgrade {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, admission)),
        Err(rejection) => rejection.into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_socket(mut socket: WebSocket, admission: Admission) {
    let Admission { user, session_id } = admission;
    tracing::info!(user_id = %user.id, session_id = %session_id, "WebSocket connected");

    let hello = ServerMessage::Connected {
        user_id: user.id.clone(),
        name: user.name.clone(),
        session_id: session_id.clone(),
    };
    if send_message(&mut socket, &hello).await.is_err() {
        return;
    }

    loop {
        let msg = match tokio::time::timeout(IDLE_TIMEOUT, socket.recv()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::warn!(user_id = %user.id, "WebSocket error: {}", e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(user_id = %user.id, "WebSocket connection closed due to idle timeout");
                let _ = send_message(
                    &mut socket,
                    &ServerMessage::error("idle_timeout", "Connection closed due to inactivity"),
                )
                .await;
                break;
            }
        };

        match msg {
            Message::Ping(data) => {
                if socket.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Message::Pong(_) => {}
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => {
                let reply = ServerMessage::error("unsupported", "No messages are accepted on this connection");
                if send_message(&mut socket, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(user_id = %user.id, session_id = %session_id, "WebSocket connection closed");
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::state::test_support::{TestApp, test_app};

    fn params(token: Option<String>, session_id: Option<&str>) -> HandshakeParams {
        HandshakeParams {
            token,
            session_id: session_id.map(str::to_string),
        }
    }

    async fn issue(app: &TestApp, user_id: &str) -> String {
        app.state
            .sessions
            .issue(user_id, serde_json::Value::Null)
            .await
            .unwrap()
            .session_id
    }

    #[tokio::test]
    async fn test_admits_valid_client() {
        let app = test_app(ServerConfig::new());
        let session_id = issue(&app, "u1").await;

        let admission = admit(&app.state, &params(Some(app.token("u1")), Some(&session_id)))
            .await
            .unwrap();
        assert_eq!(admission.user.id, "u1");
        assert_eq!(admission.user.name, "Ada");
        assert_eq!(admission.session_id, session_id);
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let app = test_app(ServerConfig::new());

        let err = admit(&app.state, &params(None, Some("s1"))).await.unwrap_err();
        assert_eq!(err, HandshakeError::MissingCredentials);

        let err = admit(&app.state, &params(Some(app.token("u1")), None))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::MissingCredentials);

        let err = admit(&app.state, &params(Some(String::new()), Some("s1")))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing token or sessionId");
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let app = test_app(ServerConfig::new());
        let err = admit(&app.state, &params(Some("forged".into()), Some("s1")))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::InvalidToken);
    }

    #[tokio::test]
    async fn test_session_of_another_user_is_invalid() {
        let app = test_app(ServerConfig::new());
        let session_id = issue(&app, "u1").await;

        let err = admit(&app.state, &params(Some(app.token("u2")), Some(&session_id)))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::InvalidSession);
    }

    #[tokio::test]
    async fn test_expired_session_is_invalid() {
        let app = test_app(ServerConfig::new());
        let session_id = issue(&app, "u1").await;
        app.clock.advance(Duration::from_secs(3600));

        let err = admit(&app.state, &params(Some(app.token("u1")), Some(&session_id)))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::InvalidSession);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let app = test_app(ServerConfig::new());
        let session_id = issue(&app, "ghost").await;

        let err = admit(&app.state, &params(Some(app.token("ghost")), Some(&session_id)))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::UserNotFound);
    }

    #[tokio::test]
    async fn test_store_outage_is_retryable_rejection() {
        let app = test_app(ServerConfig::new());
        let session_id = issue(&app, "u1").await;
        app.kv.set_down(true);

        let err = admit(&app.state, &params(Some(app.token("u1")), Some(&session_id)))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::Unavailable);
    }

    #[tokio::test]
    async fn test_rejection_is_json_message() {
        let app = test_app(ServerConfig::new());
        let router = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(app.state.clone());

        let response = router
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Missing token or sessionId");
    }

    #[tokio::test]
    async fn test_admitted_plain_http_request_is_not_upgraded() {
        let app = test_app(ServerConfig::new());
        let session_id = issue(&app, "u1").await;
        let router = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(app.state.clone());

        let uri = format!("/ws?token={}&sessionId={}", app.token("u1"), session_id);
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        // Admitted, but without upgrade headers there is no socket to hand over.
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
