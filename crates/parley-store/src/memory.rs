//! Single-process backing store.
//!
//! Mirrors the subset of Redis semantics the rest of the workspace relies on:
//! string values, per-key TTLs evaluated against the injected [`Clock`],
//! sets, atomic increments and all-or-nothing batches. Nothing is shared
//! across processes, so this is only suitable for local runs and tests.
//!
//! Expired keys are dropped when touched and by a full sweep every
//! [`SWEEP_EVERY_WRITES`] writes, so keys written once and never read again
//! (rate-limit windows) do not accumulate.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::batch::{WriteBatch, WriteOp};
use crate::clock::{SharedClock, SystemClock};
use crate::error::{Result, StoreError};
use crate::KeyValueStore;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Writes between full sweeps of expired keys.
pub const SWEEP_EVERY_WRITES: u64 = 1024;

/// In-memory [`KeyValueStore`].
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: SharedClock,
    writes: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Create an empty store that evaluates TTLs against `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            writes: AtomicU64::new(0),
        }
    }

    /// Drop every expired key, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        sweep(&mut self.entries.lock(), now)
    }

    /// Count a write and sweep once enough have accumulated.
    fn note_write(&self, entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) {
        if self.writes.fetch_add(1, Ordering::Relaxed) + 1 >= SWEEP_EVERY_WRITES {
            self.writes.store(0, Ordering::Relaxed);
            sweep(entries, now);
        }
    }

    /// Remaining TTL of a live key, `None` when absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        let entry = entries.get(key).filter(|e| e.live_at(now))?;
        entry
            .expires_at
            .and_then(|at| (at - now).to_std().ok())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.lock().values().filter(|e| e.live_at(now)).count()
    }

    /// Whether no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(entries: &mut HashMap<String, Entry>, op: &WriteOp, now: DateTime<Utc>) -> Result<()> {
        evict_if_expired(entries, op.key(), now);
        match op {
            WriteOp::Set { key, value } => {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: Value::Str(value.clone()),
                        expires_at: None,
                    },
                );
            }
            WriteOp::Expire { key, ttl } => {
                if let Some(entry) = entries.get_mut(key) {
                    entry.expires_at = Some(deadline(now, *ttl));
                }
            }
            WriteOp::SetAdd { key, member } => {
                let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                    value: Value::Set(BTreeSet::new()),
                    expires_at: None,
                });
                match &mut entry.value {
                    Value::Set(members) => {
                        members.insert(member.clone());
                    }
                    Value::Str(_) => return Err(StoreError::WrongType(key.clone())),
                }
            }
            WriteOp::SetRemove { key, member } => {
                let now_empty = match entries.get_mut(key).map(|e| &mut e.value) {
                    Some(Value::Set(members)) => {
                        members.remove(member);
                        members.is_empty()
                    }
                    Some(Value::Str(_)) => return Err(StoreError::WrongType(key.clone())),
                    None => false,
                };
                if now_empty {
                    entries.remove(key);
                }
            }
            WriteOp::Delete { key } => {
                entries.remove(key);
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn sweep(entries: &mut HashMap<String, Entry>, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.live_at(now));
    let removed = before - entries.len();
    if removed > 0 {
        debug!(removed, remaining = entries.len(), "Swept expired keys");
    }
    removed
}

fn evict_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
    if entries.get(key).is_some_and(|e| !e.live_at(now)) {
        trace!(key = %key, "Evicting expired key");
        entries.remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::Set(_)) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = self.clock.now();
        let op = WriteOp::Set {
            key: key.to_string(),
            value: value.to_string(),
        };
        let mut entries = self.entries.lock();
        Self::apply(&mut entries, &op, now)?;
        self.note_write(&mut entries, now);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);
        Ok(entries.remove(key).is_some())
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        let current = match &entry.value {
            Value::Str(s) => s
                .parse::<i64>()
                .map_err(|_| StoreError::WrongType(key.to_string()))?,
            Value::Set(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        let next = current + 1;
        entry.value = Value::Str(next.to_string());
        self.note_write(&mut entries, now);
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(deadline(now, ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        let added = match &mut entry.value {
            Value::Set(members) => members.insert(member.to_string()),
            Value::Str(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        self.note_write(&mut entries, now);
        Ok(added)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);
        let (removed, now_empty) = match entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(members)) => (members.remove(member), members.is_empty()),
            Some(Value::Str(_)) => return Err(StoreError::WrongType(key.to_string())),
            None => (false, false),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        evict_if_expired(&mut entries, key, now);
        match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Value::Str(_)) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn execute(&self, batch: &WriteBatch) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        // Apply against a scratch copy of the touched keys so a failing op
        // leaves the live map untouched.
        let mut staged: HashMap<String, Entry> = HashMap::new();
        for op in batch.ops() {
            if let Some(entry) = entries.get(op.key()) {
                staged.entry(op.key().to_string()).or_insert_with(|| entry.clone());
            }
        }
        for op in batch.ops() {
            Self::apply(&mut staged, op, now)
                .map_err(|e| StoreError::Transaction(e.to_string()))?;
        }

        for op in batch.ops() {
            match staged.get(op.key()) {
                Some(entry) => {
                    entries.insert(op.key().to_string(), entry.clone());
                }
                None => {
                    entries.remove(op.key());
                }
            }
        }
        self.note_write(&mut entries, now);
        Ok(())
    }
}
