//! Remaining-lifetime computation for session records.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Remaining lifetimes at or below this are considered too short to trust.
pub const MIN_REMAINING_TTL: Duration = Duration::from_millis(500);

/// TTL applied instead of a too-short remaining lifetime.
pub const SHORT_TTL_FLOOR: Duration = Duration::from_millis(1000);

/// Longest lifetime a session can be issued with (ten years).
pub const MAX_SESSION_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// TTL for a record that should live until `expires_at`.
///
/// A remaining time of 500ms or less (including already-past deadlines) is
/// raised to one second, so clock skew or a slow save cannot expire the record
/// before the caller reads it back.
pub fn remaining_ttl(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining_ms = (expires_at - now).num_milliseconds();
    if remaining_ms <= MIN_REMAINING_TTL.as_millis() as i64 {
        return SHORT_TTL_FLOOR;
    }
    Duration::from_millis(remaining_ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_long_lifetime_passes_through() {
        assert_eq!(remaining_ttl(at(60_000), at(0)), Duration::from_secs(60));
        assert_eq!(remaining_ttl(at(501), at(0)), Duration::from_millis(501));
    }

    #[test]
    fn test_short_lifetime_is_floored() {
        assert_eq!(remaining_ttl(at(500), at(0)), SHORT_TTL_FLOOR);
        assert_eq!(remaining_ttl(at(1), at(0)), SHORT_TTL_FLOOR);
        assert_eq!(remaining_ttl(at(0), at(0)), SHORT_TTL_FLOOR);
    }

    #[test]
    fn test_past_deadline_is_floored() {
        let now = Utc::now();
        assert_eq!(
            remaining_ttl(now - ChronoDuration::minutes(5), now),
            SHORT_TTL_FLOOR
        );
    }
}
