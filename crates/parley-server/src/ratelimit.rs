//! Admission control and request logging middleware.
//!
//! Every request is counted against an identity before it reaches a handler:
//! the verified token subject when the caller presents a valid token (header or
//! `token` query parameter), else the peer IP, else `anonymous`.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::bearer_token;
use crate::error::ServerError;
use crate::state::AppState;

/// Seconds until the next window opens.
const RETRY_AFTER_SECS: u64 = 1;

/// Identity used when nothing better is known about the caller.
pub const ANONYMOUS_IDENTITY: &str = "anonymous";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Rate limit error response.
#[derive(Debug, Serialize)]
struct RateLimitError {
    code: String,
    message: String,
    retry_after_seconds: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Work out whose budget this request is charged to.
pub fn request_identity(request: &Request<Body>, state: &AppState) -> String {
    let token = bearer_token(request.headers()).ok().map(str::to_string).or_else(|| {
        Query::<HashMap<String, String>>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(params)| params.get("token").cloned())
    });

    if let Some(token) = token
        && let Ok(user_id) = state.verifier.verify(&token)
    {
        return format!("user:{}", user_id);
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }

    ANONYMOUS_IDENTITY.to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Per-identity rate limiting middleware.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.rate_limiting {
        return next.run(request).await;
    }

    let identity = request_identity(&request, &state);
    let decision = state.limiter.check(&identity).await;

    if decision.allowed {
        return next.run(request).await;
    }

    tracing::warn!(
        identity = %identity,
        path = %request.uri().path(),
        count = ?decision.count,
        limit = decision.limit,
        "Rate limit exceeded"
    );

    let (status, code) = ServerError::RateLimitExceeded.status_and_code();
    let error = RateLimitError {
        code: code.to_string(),
        message: ServerError::RateLimitExceeded.to_string(),
        retry_after_seconds: RETRY_AFTER_SECS,
    };

    (
        status,
        [("Retry-After", RETRY_AFTER_SECS.to_string())],
        axum::Json(error),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// Request Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Structured request logging middleware.
///
/// Logs method, path, status, and duration.
pub async fn request_logging_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.request_logging {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = %status.as_u16(),
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
