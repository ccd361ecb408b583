//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use parley_ratelimit::{RateLimitPolicy, RateLimiter};
use parley_server::{AppState, JwtVerifier, Server, ServerConfig, StaticUserDirectory, User};
use parley_session::{
    DistributedSessionStore, ReadConsistency, SessionService, SharedSessionStore,
};
use parley_store::{MemoryStore, SharedStore, SystemClock};

/// Signing secret shared by the test server and its tokens.
pub const SECRET: &str = "integration-test-secret";

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Signs tokens the server accepts.
    pub signer: JwtVerifier,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with rate limiting disabled.
    pub async fn start() -> Result<Self> {
        Self::start_with(None).await
    }

    /// Start a test server limiting each identity to `rps` requests per second.
    pub async fn start_with_limit(rps: u32) -> Result<Self> {
        Self::start_with(Some(rps)).await
    }

    async fn start_with(rps: Option<u32>) -> Result<Self> {
        let addr = find_available_port().await?;

        let clock = SystemClock::shared();
        let kv: SharedStore = Arc::new(MemoryStore::with_clock(clock.clone()));
        let store: SharedSessionStore = Arc::new(
            DistributedSessionStore::new(kv.clone(), clock.clone())
                .with_consistency(ReadConsistency::Linearizable),
        );
        let sessions = SessionService::new(store, clock.clone(), Duration::from_secs(3600));
        let limiter = RateLimiter::new(
            kv,
            clock,
            RateLimitPolicy::default().with_requests_per_second(rps.unwrap_or(5)),
        );

        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_rate_limiting(rps.is_some())
            .with_request_logging(false);
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

        // Start server in background
        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            signer: JwtVerifier::new(SECRET),
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket handshake URL for the given credentials.
    pub fn ws_url(&self, token: &str, session_id: &str) -> String {
        format!("ws://{}/ws?token={}&sessionId={}", self.addr, token, session_id)
    }

    /// A valid access token for `user_id`.
    pub fn token(&self, user_id: &str) -> String {
        self.signer.sign(user_id, 3600).unwrap()
    }

    /// Get an authenticated GET request builder.
    pub fn get(&self, user_id: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .bearer_auth(self.token(user_id))
    }

    /// Get an authenticated POST request builder.
    pub fn post(&self, user_id: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .bearer_auth(self.token(user_id))
    }

    /// Get an authenticated DELETE request builder.
    pub fn delete(&self, user_id: &str, path: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(format!("{}{}", self.base_url(), path))
            .bearer_auth(self.token(user_id))
    }

    /// Issue a session for `user_id` and return its id.
    pub async fn issue_session(&self, user_id: &str) -> Result<String> {
        let resp = self
            .post(user_id, "/api/v1/sessions")
            .json(&serde_json::json!({ "payload": { "room": "lobby" } }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().as_u16() == 201, "issue failed: {}", resp.status());
        let body: serde_json::Value = resp.json().await?;
        body["sessionId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("response has no sessionId"))
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
