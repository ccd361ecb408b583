//! Backing store client for Parley.
//!
//! All shared mutable state for sessions and rate limits lives in an external
//! key-value store. This crate provides:
//! - [`KeyValueStore`], the narrow async interface the session and rate-limit
//!   layers are written against (strings, TTLs, sets, atomic counters and
//!   all-or-nothing [`WriteBatch`] execution)
//! - [`RedisStore`], the production implementation
//! - [`MemoryStore`], a single-process implementation for local runs and tests
//! - [`Clock`], an injectable time source
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_store::{KeyValueStore, RedisStore, WriteBatch};
//!
//! let store = RedisStore::connect("redis://127.0.0.1/", Duration::from_secs(30)).await?;
//! let batch = WriteBatch::new()
//!     .set("session:session:abc", "{...}")
//!     .expire("session:session:abc", Duration::from_secs(60))
//!     .set_add("session:user:u1", "abc");
//! store.execute(&batch).await?;
//! ```

mod batch;
mod clock;
mod error;
mod memory;
mod redis_store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use batch::{WriteBatch, WriteOp};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::{Result, StoreError};
pub use memory::{MemoryStore, SWEEP_EVERY_WRITES};
pub use redis_store::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Shared handle to a backing store.
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Operations the session store and rate limiter need from the backing store.
///
/// Every method is a single round trip. Implementations must make
/// [`increment`](KeyValueStore::increment) atomic and must apply
/// [`execute`](KeyValueStore::execute) batches all-or-nothing.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a string value. Missing or expired keys are `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a string value, clearing any TTL on the key.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key of any type. Returns whether a key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment an integer counter, creating it at 0 first if absent.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Set a key's TTL. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Add a member to a set. Returns whether the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set. Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set; empty when the key is absent.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Apply every operation in the batch as one transaction.
    async fn execute(&self, batch: &WriteBatch) -> Result<()>;
}
