//! Cache Entry Module
//!
//! A stored payload together with the time it was written and its TTL.

use chrono::Utc;

// == Cache Entry ==
/// A single backend record.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized payload
    pub value: String,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: i64,
    /// Lifetime in seconds, always positive
    pub ttl_seconds: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    pub fn new(value: String, ttl_seconds: u64) -> Self {
        Self {
            value,
            stored_at: current_timestamp_ms(),
            ttl_seconds,
        }
    }

    /// Unix milliseconds at which the entry stops being served.
    pub fn expires_at(&self) -> i64 {
        let ttl_ms = i64::try_from(self.ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.stored_at.saturating_add(ttl_ms)
    }

    // == Is Expired ==
    /// An entry is expired once `now - stored_at >= ttl`: at exactly the
    /// TTL boundary it is already a miss.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at()
    }

    /// Remaining lifetime in milliseconds, zero once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        let remaining = self.expires_at() - current_timestamp_ms();
        u64::try_from(remaining).unwrap_or(0)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}
