//! Cache-Aside Coordinator
//!
//! The public entry point: read the cache, and on a miss run the
//! computation once per key across concurrent callers, store its result
//! and hand it to everyone waiting.
//!
//! # Policies
//! - A failed computation is returned to every joined caller and never
//!   written to the cache.
//! - Results that serialize to JSON `null` (for example `Option::None`)
//!   are returned but not cached. Empty arrays, strings and objects are
//!   cached like any other value.
//! - A TTL of `None`, zero or a negative number falls back to the
//!   coordinator's default TTL.
//! - Cache failures never surface; a dead backend means every call
//!   recomputes.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStats, InFlightRegistry, KvBackend, StatsRecorder, TtlStore};
use crate::error::{CacheError, Result};

/// TTL used when neither the caller nor the configuration provides one.
pub const DEFAULT_TTL_SECONDS: u64 = 300;

// == Fetch Options ==
/// Per-call options for [`CacheCoordinator::get_cached_or_fetch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// TTL in seconds. Non-positive values mean "use the default".
    pub ttl_seconds: Option<i64>,
}

impl FetchOptions {
    pub fn ttl(seconds: i64) -> Self {
        Self {
            ttl_seconds: Some(seconds),
        }
    }
}

// == Cache Coordinator ==
/// Cache-aside orchestrator over a TTL store and an in-flight registry.
pub struct CacheCoordinator {
    store: TtlStore,
    inflight: InFlightRegistry,
    stats: Arc<StatsRecorder>,
    default_ttl: u64,
}

impl CacheCoordinator {
    // == Constructor ==
    /// Creates a coordinator. `default_ttl` must be positive.
    pub fn new(backend: Arc<dyn KvBackend>, default_ttl: u64) -> Result<Self> {
        if default_ttl == 0 {
            return Err(CacheError::InvalidRequest(
                "Default TTL must be positive".to_string(),
            ));
        }
        Ok(Self {
            store: TtlStore::new(backend),
            inflight: InFlightRegistry::new(),
            stats: Arc::new(StatsRecorder::new()),
            default_ttl,
        })
    }

    pub fn store(&self) -> &TtlStore {
        &self.store
    }

    pub fn inflight(&self) -> &InFlightRegistry {
        &self.inflight
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Resolves the TTL a write made with `options` will use.
    pub fn effective_ttl(&self, options: FetchOptions) -> u64 {
        match options.ttl_seconds {
            Some(ttl) if ttl > 0 => ttl as u64,
            _ => self.default_ttl,
        }
    }

    // == Get Cached Or Fetch ==
    /// Returns the cached value for `key`, or computes, caches and returns
    /// it. Concurrent misses on the same key share a single computation.
    ///
    /// The computation runs on the runtime, not in the caller's task:
    /// abandoning this future (for example on a timeout) leaves it running,
    /// and its result still lands in the cache.
    pub async fn get_cached_or_fetch<T, F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
        options: FetchOptions,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if let Some(hit) = self.store.get::<T>(key).await {
            self.stats.record_hit();
            debug!(key = %key, "cache hit");
            return Ok(hit);
        }
        self.stats.record_miss();

        let ttl_seconds = self.effective_ttl(options);
        let store = self.store.clone();
        let stats = Arc::clone(&self.stats);
        let cache_key = key.clone();

        let flight = self.inflight.begin(key, move || {
            stats.record_compute();
            let pending = compute();
            async move {
                let value = match pending.await {
                    Ok(value) => value,
                    Err(err) => {
                        stats.record_compute_failure();
                        warn!(key = %cache_key, error = %err, "computation failed, nothing cached");
                        return Err(CacheError::compute(err));
                    }
                };
                write_result(&store, &stats, &cache_key, &value, ttl_seconds).await;
                Ok(value)
            }
        });

        if flight.joined() {
            self.stats.record_join();
        }
        flight.wait().await
    }

    // == Invalidate ==
    /// Drops the cached value for `key`. A running computation for the key
    /// is not affected and will still store its result.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.store.delete(key).await;
        debug!(key = %key, "cache entry invalidated");
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats
            .snapshot(self.store.failures(), self.inflight.len())
    }
}

async fn write_result<T: Serialize>(
    store: &TtlStore,
    stats: &StatsRecorder,
    key: &CacheKey,
    value: &T,
    ttl_seconds: u64,
) {
    let json = match serde_json::to_value(value) {
        Ok(json) => json,
        Err(err) => {
            store.record_failure();
            warn!(key = %key, error = %err, "result is not JSON-serializable, not cached");
            return;
        }
    };

    if json.is_null() {
        stats.record_skipped_write();
        debug!(key = %key, "null result, not cached");
        return;
    }

    store.set_json(key, &json, ttl_seconds).await;
}
