//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]          # bind address, request logging
//! [backing_store]   # shared key-value store
//! [session]         # session backend and lifetime
//! [rate_limit]      # per-identity admission control
//! [auth]            # token verification
//! [[users]]         # known users
//! [logging]         # level and optional JSON log directory
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default port for the HTTP/WebSocket server.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default backing store URL.
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379";

/// Default per-command timeout for the backing store, in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Longest accepted session lifetime (ten years).
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Default wait before the post-commit re-read, in milliseconds.
pub const DEFAULT_VERIFY_RETRY_DELAY_MS: u64 = 5;

/// Default interval between expired-session sweeps of the document backend.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

/// Default admissions per identity per second.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Every section has defaults, so an empty file is a valid (if unusable
/// without a JWT secret) configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub server: ServerConfig,
    pub backing_store: BackingStoreConfig,
    pub session: SessionConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
    pub users: Vec<UserEntry>,
    pub logging: LoggingConfig,
}

impl ParleyConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy of this config with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.auth.jwt_secret.is_some() {
            config.auth.jwt_secret = Some("********".to_string());
        }
        config
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests_per_second == 0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit.requests_per_second".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "session.ttl_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.session.ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "session.ttl_secs".to_string(),
                reason: format!("must be at most {}", MAX_SESSION_TTL_SECS),
            });
        }

        if self.backing_store.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "backing_store.command_timeout_ms".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        match self.auth.jwt_secret.as_deref() {
            None | Some("") => {
                return Err(ConfigError::MissingField {
                    field: "jwt_secret".to_string(),
                    context: "[auth] (or set PARLEY_JWT_SECRET)".to_string(),
                });
            }
            Some(_) => {}
        }

        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if user.id.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "users.id".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            if !seen.insert(user.id.as_str()) {
                return Err(ConfigError::Invalid {
                    field: "users.id".to_string(),
                    reason: format!("duplicate user '{}'", user.id),
                });
            }
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backing Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which key-value store backs sessions and rate-limit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackingStoreKind {
    /// Shared Redis server.
    #[default]
    Redis,
    /// In-process map. Single instance only.
    Memory,
}

/// Backing store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackingStoreConfig {
    pub kind: BackingStoreKind,
    /// Connection URL (Redis only).
    pub url: String,
    /// Bound on every command round trip.
    pub command_timeout_ms: u64,
}

impl Default for BackingStoreConfig {
    fn default() -> Self {
        Self {
            kind: BackingStoreKind::default(),
            url: DEFAULT_STORE_URL.to_string(),
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
        }
    }
}

impl BackingStoreConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Where session records live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Records and user index in the backing store.
    #[default]
    Distributed,
    /// SQLite document table.
    Document,
}

/// Read consistency of the backing store as seen by session saves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
    /// Re-read once after a short delay if a committed write is not yet visible.
    #[default]
    Eventual,
    /// Committed writes are always visible; verify with a single read.
    Linearizable,
}

/// Session configuration.
///
/// ```toml
/// [session]
/// backend = "document"
/// ttl_secs = 3600
/// document_path = "/var/lib/parley/sessions.db"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    /// Lifetime of issued and renewed sessions.
    pub ttl_secs: u64,
    pub consistency: Consistency,
    pub verify_retry_delay_ms: u64,
    /// SQLite file for the document backend. Unset keeps it in memory.
    pub document_path: Option<PathBuf>,
    /// Seconds between sweeps of expired document rows. 0 disables sweeping.
    pub purge_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::default(),
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            consistency: Consistency::default(),
            verify_retry_delay_ms: DEFAULT_VERIFY_RETRY_DELAY_MS,
            document_path: None,
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn verify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.verify_retry_delay_ms)
    }

    /// Sweep interval, `None` when disabled.
    pub fn purge_interval(&self) -> Option<Duration> {
        (self.purge_interval_secs > 0).then(|| Duration::from_secs(self.purge_interval_secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rate Limit Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Behaviour when the backing store cannot count a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnStoreError {
    /// Admit (fail open).
    #[default]
    Allow,
    /// Reject (fail closed).
    Deny,
}

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub on_store_error: OnStoreError,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            on_store_error: OnStoreError::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth and Users
// ─────────────────────────────────────────────────────────────────────────────

/// Token verification settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Prefer `PARLEY_JWT_SECRET` over the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

/// A known user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for daily-rolling JSON log files. Unset logs to console only.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ParleyConfig {
        let mut config = ParleyConfig::new();
        config.auth.jwt_secret = Some("s3cret".to_string());
        config
    }

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = ParleyConfig::from_toml("").unwrap();
        assert_eq!(config, ParleyConfig::default());
        assert_eq!(config.rate_limit.requests_per_second, 5);
        assert_eq!(config.backing_store.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.session.verify_retry_delay(), Duration::from_millis(5));
        assert_eq!(config.session.backend, SessionBackend::Distributed);
    }

    #[test]
    fn test_full_toml() {
        let config = ParleyConfig::from_toml(
            r#"
[server]
port = 9000
bind = "0.0.0.0"

[backing_store]
kind = "memory"

[session]
backend = "document"
ttl_secs = 600
consistency = "linearizable"
document_path = "/tmp/sessions.db"
purge_interval_secs = 0

[rate_limit]
requests_per_second = 10
on_store_error = "deny"

[auth]
jwt_secret = "abc"

[[users]]
id = "u1"
name = "Ada"

[[users]]
id = "u2"

[logging]
level = "debug"
dir = "/var/log/parley"
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert!(config.server.request_logging);
        assert_eq!(config.backing_store.kind, BackingStoreKind::Memory);
        assert_eq!(config.backing_store.url, DEFAULT_STORE_URL);
        assert_eq!(config.session.backend, SessionBackend::Document);
        assert_eq!(config.session.ttl(), Duration::from_secs(600));
        assert_eq!(config.session.consistency, Consistency::Linearizable);
        assert_eq!(config.session.purge_interval(), None);
        assert_eq!(config.rate_limit.on_store_error, OnStoreError::Deny);
        assert_eq!(config.users.len(), 2);
        assert_eq!(config.users[1].name, "");
        assert_eq!(config.logging.dir, Some(PathBuf::from("/var/log/parley")));
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let err = ParleyConfig::from_toml("[session]\nbackend = \"mongo\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_requires_secret() {
        let err = ParleyConfig::new().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));

        let mut config = valid();
        config.auth.jwt_secret = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limit_and_ttl() {
        let mut config = valid();
        config.rate_limit.requests_per_second = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.session.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_ttl() {
        let mut config = valid();
        config.session.ttl_secs = MAX_SESSION_TTL_SECS;
        assert!(config.validate().is_ok());

        config.session.ttl_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "session.ttl_secs"));
    }

    #[test]
    fn test_validate_rejects_duplicate_users() {
        let mut config = valid();
        config.users = vec![
            UserEntry { id: "u1".into(), name: "a".into() },
            UserEntry { id: "u1".into(), name: "b".into() },
        ];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_redacted_masks_secret() {
        let text = valid().redacted().to_toml().unwrap();
        assert!(!text.contains("s3cret"));
        assert!(text.contains("********"));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = valid();
        config.users.push(UserEntry { id: "u1".into(), name: "Ada".into() });
        let parsed = ParleyConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
