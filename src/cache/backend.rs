//! Key-Value Backend Contract
//!
//! The minimal surface the TTL store needs from an external key-value
//! store. Redis, Memcached, a filesystem cache or the bundled
//! [`MemoryBackend`](crate::cache::MemoryBackend) all fit.

use async_trait::async_trait;

use crate::error::Result;

/// String key-value store with per-entry expiry.
///
/// Implementations report failures as errors; the TTL store above them
/// decides that those failures never reach callers.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    /// Returns the stored payload, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key`, replacing any previous payload, expiring
    /// after `ttl_seconds`.
    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()>;

    /// Removes `key`. Absent keys are not an error.
    async fn del(&self, key: &str) -> Result<()>;
}
