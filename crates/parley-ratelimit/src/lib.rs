//! Per-identity admission control for Parley.
//!
//! Each identity gets at most `requests_per_second` admissions per calendar
//! second. Counters live in the shared backing store, so every server
//! instance sees the same count:
//!
//! - key `rl:{identity}:{epoch_second}`
//! - `INCR` the key; the first hit in a window sets a one second expiry
//! - admitted while the post-increment count is within the limit
//!
//! Windows are aligned to wall-clock seconds, so a burst straddling a
//! boundary can see up to twice the limit inside any sliding one second span.
//! Rejected calls still increment the counter.
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_ratelimit::{RateLimiter, RateLimitPolicy};
//!
//! let limiter = RateLimiter::new(kv, clock, RateLimitPolicy::default());
//! if !limiter.is_allowed("u1").await {
//!     // reject with 429
//! }
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parley_store::{SharedClock, SharedStore, StoreError};
use tracing::{debug, warn};

/// Default admissions per identity per second.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 5;

/// Lifetime of a window counter.
const WINDOW: Duration = Duration::from_secs(1);

/// What to do when the backing store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFailurePolicy {
    /// Admit the request (fail open).
    #[default]
    Allow,
    /// Reject the request (fail closed).
    Deny,
}

/// Limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub requests_per_second: u32,
    pub on_store_error: StoreFailurePolicy,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            on_store_error: StoreFailurePolicy::default(),
        }
    }
}

impl RateLimitPolicy {
    pub fn with_requests_per_second(mut self, limit: u32) -> Self {
        self.requests_per_second = limit;
        self
    }

    pub fn with_on_store_error(mut self, policy: StoreFailurePolicy) -> Self {
        self.on_store_error = policy;
        self
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Count observed for the window; `None` when the store was unreachable.
    pub count: Option<i64>,
    pub limit: u32,
    pub window_start: DateTime<Utc>,
}

/// Fixed-window limiter over the shared backing store.
#[derive(Clone)]
pub struct RateLimiter {
    kv: SharedStore,
    clock: SharedClock,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(kv: SharedStore, clock: SharedClock, policy: RateLimitPolicy) -> Self {
        Self { kv, clock, policy }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Counter key for `identity` in the window starting at `epoch_second`.
    pub fn window_key(identity: &str, epoch_second: i64) -> String {
        format!("rl:{}:{}", identity, epoch_second)
    }

    /// Whether `identity` may make another request in the current second.
    pub async fn is_allowed(&self, identity: &str) -> bool {
        self.check(identity).await.allowed
    }

    /// Count this request against `identity` and decide whether to admit it.
    pub async fn check(&self, identity: &str) -> RateDecision {
        let epoch_second = self.clock.now().timestamp();
        let window_start = Utc
            .timestamp_opt(epoch_second, 0)
            .single()
            .unwrap_or_default();
        let limit = self.policy.requests_per_second;

        match self.count(identity, epoch_second).await {
            Ok(count) => {
                let allowed = count <= i64::from(limit);
                if !allowed {
                    debug!(identity = %identity, count, limit, "Rate limit exceeded");
                }
                RateDecision {
                    allowed,
                    count: Some(count),
                    limit,
                    window_start,
                }
            }
            Err(e) => {
                let allowed = self.policy.on_store_error == StoreFailurePolicy::Allow;
                warn!(
                    identity = %identity,
                    error = %e,
                    allowed,
                    "Rate limiter store unavailable, applying failure policy"
                );
                RateDecision {
                    allowed,
                    count: None,
                    limit,
                    window_start,
                }
            }
        }
    }

    async fn count(&self, identity: &str, epoch_second: i64) -> Result<i64, StoreError> {
        let key = Self::window_key(identity, epoch_second);
        let count = self.kv.increment(&key).await?;

        if count == 1
            && let Err(e) = self.kv.expire(&key, WINDOW).await
        {
            // The key names a past second once this window closes, so a missing
            // expiry only leaks the counter.
            warn!(key = %key, error = %e, "Failed to set window expiry");
        }
        Ok(count)
    }
}
