//! Cache Statistics Module
//!
//! Counters for the coordinator (hits, misses, de-duplicated joins,
//! computations) and for the in-memory backend.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of coordinator counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CacheStats {
    /// Reads served from the cache
    pub hits: u64,
    /// Reads that fell through to the in-flight registry
    pub misses: u64,
    /// Misses that joined an already running computation
    pub joined: u64,
    /// Computations started
    pub computes: u64,
    /// Computations that failed
    pub compute_failures: u64,
    /// Successful computations whose result was not cached (null results)
    pub skipped_writes: u64,
    /// Absorbed cache failures: backend errors plus payloads that could not
    /// be encoded or decoded (bad JSON, bad base64)
    pub backend_errors: u64,
    /// Computations running right now
    pub in_flight: usize,
}

impl CacheStats {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads happened.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared between concurrent callers.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
    computes: AtomicU64,
    compute_failures: AtomicU64,
    skipped_writes: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_join(&self) {
        self.joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compute(&self) {
        self.computes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compute_failure(&self) {
        self.compute_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_write(&self) {
        self.skipped_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Builds a snapshot; gauges owned elsewhere are passed in.
    pub fn snapshot(&self, backend_errors: u64, in_flight: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
            backend_errors,
            in_flight,
        }
    }
}

// == Backend Stats ==
/// Counters kept by the in-memory backend.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BackendStats {
    /// Entries currently stored, expired or not
    pub entries: usize,
    /// Entries dropped to stay within capacity
    pub evictions: u64,
    /// Entries dropped because their TTL elapsed
    pub expirations: u64,
}
