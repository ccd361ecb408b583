//! Fault injection for tests.
//!
//! [`FlakyStore`] wraps any [`KeyValueStore`] and can be told to misbehave in
//! the specific ways a networked store does: reads that lag behind a commit,
//! individual commands that fail, or the whole store going away.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::batch::WriteBatch;
use crate::error::{Result, StoreError};
use crate::KeyValueStore;

/// A [`KeyValueStore`] wrapper with switchable faults.
pub struct FlakyStore<S> {
    inner: S,
    hidden_reads: Mutex<HashMap<String, usize>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_batches: AtomicBool,
    down: AtomicBool,
    gets: AtomicUsize,
}

impl<S: KeyValueStore> FlakyStore<S> {
    /// Wrap `inner` with every fault switched off.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            hidden_reads: Mutex::new(HashMap::new()),
            failing_deletes: Mutex::new(HashSet::new()),
            fail_batches: AtomicBool::new(false),
            down: AtomicBool::new(false),
            gets: AtomicUsize::new(0),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make the next `reads` calls to `get(key)` return `None` even if the key exists.
    pub fn hide_reads(&self, key: impl Into<String>, reads: usize) {
        self.hidden_reads.lock().insert(key.into(), reads);
    }

    /// Make every `delete(key)` fail.
    pub fn fail_deletes_of(&self, key: impl Into<String>) {
        self.failing_deletes.lock().insert(key.into());
    }

    /// Make every batch execution fail without applying anything.
    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail as if the store were unreachable.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Number of `get` calls seen so far.
    pub fn get_calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }

    fn take_hidden_read(&self, key: &str) -> bool {
        let mut hidden = self.hidden_reads.lock();
        match hidden.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> KeyValueStore for FlakyStore<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        if self.take_hidden_read(key) {
            return Ok(None);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_up()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_up()?;
        if self.failing_deletes.lock().contains(key) {
            return Err(StoreError::Unavailable(format!("injected delete failure for {}", key)));
        }
        self.inner.delete(key).await
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.check_up()?;
        self.inner.increment(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_up()?;
        self.inner.expire(key, ttl).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.check_up()?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.check_up()?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check_up()?;
        self.inner.set_members(key).await
    }

    async fn execute(&self, batch: &WriteBatch) -> Result<()> {
        self.check_up()?;
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(StoreError::Transaction("injected EXEC abort".to_string()));
        }
        self.inner.execute(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[tokio::test]
    async fn test_hidden_reads_expire() {
        let store = FlakyStore::new(MemoryStore::new());
        store.set("k", "v").await.unwrap();
        store.hide_reads("k", 2);

        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_down_fails_everything() {
        let store = FlakyStore::new(MemoryStore::new());
        store.set_down(true);
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.increment("k").await, Err(StoreError::Unavailable(_))));

        store.set_down(false);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_applies_nothing() {
        let store = FlakyStore::new(MemoryStore::new());
        store.fail_batches(true);
        let batch = WriteBatch::new().set("k", "v");
        assert!(matches!(
            store.execute(&batch).await,
            Err(StoreError::Transaction(_))
        ));
        assert!(store.inner().get("k").await.unwrap().is_none());
    }
}
