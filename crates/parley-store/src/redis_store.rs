//! Redis-backed store.
//!
//! Uses a multiplexed async connection, cloned per command. Batches are sent
//! as `MULTI`/`EXEC` pipelines. Every round trip is bounded by the configured
//! command timeout so a stalled server surfaces as [`StoreError::Timeout`]
//! instead of hanging the caller.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use tracing::{debug, error};

use crate::batch::{WriteBatch, WriteOp};
use crate::error::{Result, StoreError};
use crate::KeyValueStore;

/// Default bound on a single Redis round trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// [`KeyValueStore`] over a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    command_timeout: Duration,
}

impl RedisStore {
    /// Connect to `redis_url`, bounding the connect and every later command by
    /// `command_timeout`.
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = tokio::time::timeout(command_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Timeout(command_timeout))??;

        debug!(url = %redact(redis_url), "Connected to Redis");

        Ok(Self {
            conn,
            command_timeout,
        })
    }

    /// The per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    async fn run<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, f(self.conn.clone())).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(op, error = %e, "Redis command failed");
                Err(e.into())
            }
            Err(_) => {
                error!(op, timeout_ms = self.command_timeout.as_millis() as u64, "Redis command timed out");
                Err(StoreError::Timeout(self.command_timeout))
            }
        }
    }
}

/// Strip credentials from a connection URL before logging it.
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    // PEXPIRE with 0 deletes the key immediately; never send less than 1ms.
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.run("GET", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.run("SET", |mut conn| async move { conn.set(key, value).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self
            .run("DEL", |mut conn| async move { conn.del(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.run("INCR", |mut conn| async move { conn.incr(key, 1i64).await })
            .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let ms = ttl_millis(ttl);
        self.run("PEXPIRE", |mut conn| async move { conn.pexpire(key, ms).await })
            .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let added: i64 = self
            .run("SADD", |mut conn| async move { conn.sadd(key, member).await })
            .await?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let removed: i64 = self
            .run("SREM", |mut conn| async move { conn.srem(key, member).await })
            .await?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.run("SMEMBERS", |mut conn| async move { conn.smembers(key).await })
            .await
    }

    async fn execute(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.ops() {
            match op {
                WriteOp::Set { key, value } => pipe.set(key, value),
                WriteOp::Expire { key, ttl } => pipe.pexpire(key, ttl_millis(*ttl)),
                WriteOp::SetAdd { key, member } => pipe.sadd(key, member),
                WriteOp::SetRemove { key, member } => pipe.srem(key, member),
                WriteOp::Delete { key } => pipe.del(key),
            };
        }

        let replies: Vec<redis::Value> = self
            .run("EXEC", |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;

        // EXEC answers with one reply per queued command; anything else means
        // the transaction was discarded.
        if replies.len() != batch.len() {
            return Err(StoreError::Transaction(format!(
                "expected {} replies from EXEC, got {}",
                batch.len(),
                replies.len()
            )));
        }
        Ok(())
    }
}
