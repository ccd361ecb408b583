//! HTTP API and WebSocket handshake server for Parley sessions.
//!
//! # Features
//!
//! - Session issuance, validation, renewal and logout over REST
//! - WebSocket handshake admission against the session store
//! - Per-identity rate limiting shared across instances
//! - Request logging
//! - Periodic sweeping of expired sessions for backends that keep them
//!
//! # Example
//!
//! ```ignore
//! use parley_server::{AppState, Server, ServerConfig};
//!
//! let state = AppState::new(config, sessions, limiter, verifier, users);
//! Server::from_state(state).run().await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod routes;
pub mod state;
pub mod users;

pub use auth::{AuthError, AuthUser, Claims, JwtVerifier, SharedTokenVerifier, TokenVerifier};
pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use ratelimit::{rate_limit_middleware, request_identity, request_logging_middleware};
pub use state::AppState;
pub use users::{SharedUserDirectory, StaticUserDirectory, User, UserDirectory};

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::{Router, middleware};
use parley_session::SessionService;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// The Parley HTTP/WebSocket server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        use axum::routing::get;

        Router::new()
            // Health routes (no auth required)
            .merge(routes::health_routes())
            // WebSocket (credentials in the query string)
            .route("/ws", get(routes::ws_handler))
            .nest("/api/v1", self.api_routes())
            // Request logging (inner layer, runs first)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::request_logging_middleware,
            ))
            // Rate limiting (outer layer, runs before request logging)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// API routes (v1). Handlers authenticate through the `AuthUser` extractor.
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route(
                "/sessions",
                post(routes::issue_session_handler)
                    .get(routes::list_sessions_handler)
                    .delete(routes::delete_all_sessions_handler),
            )
            .route(
                "/sessions/{id}",
                get(routes::validate_session_handler).delete(routes::delete_session_handler),
            )
            .route("/sessions/{id}/renew", post(routes::renew_session_handler))
    }

    /// Run the server until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(std::future::pending()).await
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run_with_shutdown(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = self.state.config.bind_address;
        let router = self.router();

        let sweeper = self
            .state
            .config
            .purge_interval
            .map(|every| spawn_session_sweeper(self.state.sessions.clone(), every));

        info!(
            backend = self.state.sessions.backend_name(),
            "Starting server on {}", addr
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        if let Some(handle) = sweeper {
            handle.abort();
        }
        info!("Server stopped");
        served
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

/// Periodically remove expired sessions from the store.
pub fn spawn_session_sweeper(sessions: SessionService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Expired sessions swept"),
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use parley_session::{Session, SessionStore};
    use parley_store::SystemClock;
    use tower::ServiceExt;

    use crate::state::test_support::test_app;

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let app = test_app(ServerConfig::new());
        let router = Server::from_state(app.state).router();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_full_router_issue_then_handshake_check() {
        let app = test_app(ServerConfig::new());
        let auth = app.bearer("u1");
        let router = Server::from_state(app.state.clone()).router();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/sessions")
                    .header("Authorization", &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let session: routes::SessionResponse = serde_json::from_slice(&body).unwrap();

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/sessions/{}", session.session_id))
                    .header("Authorization", &auth)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_applies_rate_limit() {
        let app = state::test_support::test_app_with_limit(ServerConfig::new(), 2);
        let router = Server::from_state(app.state).router();

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            statuses.push(response.status());
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    /// Counts sweeps; holds nothing.
    #[derive(Default)]
    struct SweepCounter {
        sweeps: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SessionStore for SweepCounter {
        fn backend_name(&self) -> &'static str {
            "counter"
        }
        async fn save(&self, session: Session) -> parley_session::Result<Session> {
            Ok(session)
        }
        async fn find_by_session_id(&self, _: &str) -> parley_session::Result<Option<Session>> {
            Ok(None)
        }
        async fn find_by_user_id(&self, _: &str) -> parley_session::Result<Vec<Session>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _: &str, _: &str) -> parley_session::Result<()> {
            Ok(())
        }
        async fn delete_all(&self, _: &str) -> parley_session::Result<()> {
            Ok(())
        }
        async fn purge_expired(&self) -> parley_session::Result<usize> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_sweeper_runs_periodically() {
        let store = Arc::new(SweepCounter::default());
        let sessions = SessionService::new(
            store.clone(),
            SystemClock::shared(),
            Duration::from_secs(60),
        );

        let handle = spawn_session_sweeper(sessions, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(store.sweeps.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_server_config_builder() {
        let config = ServerConfig::new()
            .with_bind_address("0.0.0.0:9000".parse().unwrap())
            .with_rate_limiting(false)
            .with_request_logging(true)
            .with_purge_interval(Some(Duration::from_secs(30)));

        assert_eq!(config.bind_address.port(), 9000);
        assert!(!config.rate_limiting);
        assert!(config.request_logging);
        assert_eq!(config.purge_interval, Some(Duration::from_secs(30)));
    }
}
