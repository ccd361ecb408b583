//! Application state shared across handlers.

use std::sync::Arc;

use parley_ratelimit::RateLimiter;
use parley_session::SessionService;

use crate::auth::SharedTokenVerifier;
use crate::config::ServerConfig;
use crate::users::SharedUserDirectory;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Session issuance, validation and logout.
    pub sessions: SessionService,

    /// Per-identity admission control.
    pub limiter: RateLimiter,

    /// Bearer-token verification.
    pub verifier: SharedTokenVerifier,

    /// User lookup for issuance and the handshake.
    pub users: SharedUserDirectory,
}

impl AppState {
    /// Create a new application state.
    pub fn new(
        config: ServerConfig,
        sessions: SessionService,
        limiter: RateLimiter,
        verifier: SharedTokenVerifier,
        users: SharedUserDirectory,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sessions,
            limiter,
            verifier,
            users,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by handler and middleware tests.

    use super::*;
    use std::time::Duration;

    use parley_ratelimit::RateLimitPolicy;
    use parley_session::DistributedSessionStore;
    use parley_store::testing::FlakyStore;
    use parley_store::{ManualClock, MemoryStore};

    use crate::auth::JwtVerifier;
    use crate::users::{StaticUserDirectory, User};

    pub const SECRET: &str = "test-secret";

    pub struct TestApp {
        pub state: AppState,
        pub kv: Arc<FlakyStore<MemoryStore>>,
        pub clock: Arc<ManualClock>,
    }

    impl TestApp {
        pub fn token(&self, user_id: &str) -> String {
            JwtVerifier::new(SECRET).sign(user_id, 3600).unwrap()
        }

        pub fn bearer(&self, user_id: &str) -> String {
            format!("Bearer {}", self.token(user_id))
        }
    }

    pub fn test_app(config: ServerConfig) -> TestApp {
        test_app_with_limit(config, 5)
    }

    pub fn test_app_with_limit(config: ServerConfig, requests_per_second: u32) -> TestApp {
        let clock = Arc::new(ManualClock::at_millis(1_700_000_000_000));
        let kv = Arc::new(FlakyStore::new(MemoryStore::with_clock(clock.clone())));

        let store = Arc::new(DistributedSessionStore::new(kv.clone(), clock.clone()));
        let sessions = SessionService::new(store, clock.clone(), Duration::from_secs(3600));
        let limiter = RateLimiter::new(
            kv.clone(),
            clock.clone(),
            RateLimitPolicy::default().with_requests_per_second(requests_per_second),
        );
        let users = StaticUserDirectory::new([
            User {
                id: "u1".into(),
                name: "Ada".into(),
            },
            User {
                id: "u2".into(),
                name: "Grace".into(),
            },
        ]);

        let state = AppState::new(
            config,
            sessions,
            limiter,
            Arc::new(JwtVerifier::new(SECRET)),
            Arc::new(users),
        );
        TestApp { state, kv, clock }
    }
}
