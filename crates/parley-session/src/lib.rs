//! Ephemeral login sessions for Parley.
//!
//! This crate provides the session store and the flows built on it:
//! - [`SessionStore`], one interface over two interchangeable backends
//! - [`DistributedSessionStore`], atop the shared key-value backing store,
//!   with atomic record + index writes and post-commit visibility checks
//! - [`DocumentSessionStore`], atop a SQLite document table with logical
//!   expiry at read time
//! - [`SessionService`], issuance, renewal, validation and logout
//!
//! The backend is chosen once at start-up with [`open_session_store`].
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_session::{open_session_store, SessionService, SessionStoreConfig};
//!
//! let store = open_session_store(&SessionStoreConfig::default(), kv, clock.clone())?;
//! let service = SessionService::new(store, clock, Duration::from_secs(3600));
//! let session = service.issue("u1", serde_json::json!({})).await?;
//! ```

mod config;
mod distributed;
mod document;
mod error;
pub mod keys;
mod service;
mod session;
mod store;
mod ttl;

pub use config::{BackendKind, ReadConsistency, SessionStoreConfig};
pub use distributed::DistributedSessionStore;
pub use document::DocumentSessionStore;
pub use error::{Result, SessionError};
pub use service::{SessionService, SessionValidationResult};
pub use session::Session;
pub use store::{SessionStore, SharedSessionStore};
pub use ttl::{MAX_SESSION_TTL, MIN_REMAINING_TTL, SHORT_TTL_FLOOR, remaining_ttl};

use std::sync::Arc;

use parley_store::{SharedClock, SharedStore};
use tracing::info;

/// Open the configured session backend.
///
/// Called once at process start; the returned store is shared for the
/// lifetime of the process.
pub fn open_session_store(
    config: &SessionStoreConfig,
    kv: SharedStore,
    clock: SharedClock,
) -> Result<SharedSessionStore> {
    let store: SharedSessionStore = match config.backend {
        BackendKind::Distributed => {
            Arc::new(DistributedSessionStore::new(kv, clock).with_consistency(config.consistency))
        }
        BackendKind::Document => match &config.document_path {
            Some(path) => Arc::new(DocumentSessionStore::open(path, clock)?),
            None => Arc::new(DocumentSessionStore::open_in_memory(clock)?),
        },
    };

    info!(backend = store.backend_name(), "Session store ready");
    Ok(store)
}
