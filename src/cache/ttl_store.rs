//! TTL Store Module
//!
//! Typed JSON access to a [`KvBackend`]. Every backend or encoding failure
//! is logged and absorbed: reads degrade to misses, writes and deletes to
//! no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheKey, KvBackend};

// == TTL Store ==
/// Fail-open JSON layer over a shared key-value backend.
#[derive(Clone)]
pub struct TtlStore {
    backend: Arc<dyn KvBackend>,
    failures: Arc<AtomicU64>,
}

impl TtlStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    // == Get ==
    /// Reads and decodes a value. Absent, expired, unreadable and malformed
    /// entries all come back as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match self.backend.get(key.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                self.record_failure();
                warn!(key = %key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                self.record_failure();
                warn!(key = %key, error = %err, "malformed cache payload, treating as miss");
                None
            }
        }
    }

    // == Set ==
    /// Encodes `value` as JSON and writes it with the given TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T, ttl_seconds: u64) {
        match serde_json::to_value(value) {
            Ok(json) => self.set_json(key, &json, ttl_seconds).await,
            Err(err) => {
                self.record_failure();
                warn!(key = %key, error = %err, "value is not JSON-serializable, skipping cache write");
            }
        }
    }

    /// Writes an already encoded JSON value.
    pub async fn set_json(&self, key: &CacheKey, value: &Value, ttl_seconds: u64) {
        if let Err(err) = self
            .backend
            .set(key.as_str(), value.to_string(), ttl_seconds)
            .await
        {
            self.record_failure();
            warn!(key = %key, error = %err, "cache write failed");
            return;
        }
        debug!(key = %key, ttl_seconds, "cache entry stored");
    }

    // == Delete ==
    pub async fn delete(&self, key: &CacheKey) {
        if let Err(err) = self.backend.del(key.as_str()).await {
            self.record_failure();
            warn!(key = %key, error = %err, "cache delete failed");
        }
    }

    // == Binary Payloads ==
    /// Reads a base64-encoded binary payload.
    pub async fn get_bytes(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let encoded: String = self.get(key).await?;
        match STANDARD.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                self.record_failure();
                warn!(key = %key, error = %err, "invalid base64 payload, treating as miss");
                None
            }
        }
    }

    /// Writes a binary payload as a base64 JSON string.
    pub async fn set_bytes(&self, key: &CacheKey, bytes: &[u8], ttl_seconds: u64) {
        let encoded = STANDARD.encode(bytes);
        self.set(key, &encoded, ttl_seconds).await;
    }

    /// Number of absorbed backend or encoding failures so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}
