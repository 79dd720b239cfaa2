//! In-Memory Backend Module
//!
//! HashMap storage with LRU capacity eviction and lazy TTL expiry,
//! implementing [`KvBackend`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{BackendStats, CacheEntry, KvBackend, LruTracker, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::error::{CacheError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    evictions: u64,
    expirations: u64,
}

impl MemoryState {
    fn drop_entry(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        self.entries.remove(key).is_some()
    }
}

// == Memory Backend ==
/// Process-local key-value backend.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    max_entries: usize,
}

impl MemoryBackend {
    // == Constructor ==
    /// Creates an empty backend holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            max_entries: max_entries.max(1),
        }
    }

    // == Cleanup Expired ==
    /// Removes every expired entry. Returns the number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.write().await;
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.drop_entry(key);
        }
        state.expirations += expired.len() as u64;
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn stats(&self) -> BackendStats {
        let state = self.state.read().await;
        BackendStats {
            entries: state.entries.len(),
            evictions: state.evictions,
            expirations: state.expirations,
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.write().await;

        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.is_expired(),
        };

        if expired {
            state.drop_entry(key);
            state.expirations += 1;
            debug!(key, "dropped expired entry on read");
            return Ok(None);
        }

        state.lru.touch(key);
        Ok(state.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::InvalidRequest(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(CacheError::InvalidRequest(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }
        if ttl_seconds == 0 {
            return Err(CacheError::InvalidRequest(
                "TTL must be positive".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let is_overwrite = state.entries.contains_key(key);
        if !is_overwrite && state.entries.len() >= self.max_entries {
            match state.lru.evict_oldest() {
                Some(evicted) => {
                    state.entries.remove(&evicted);
                    state.evictions += 1;
                    debug!(key = %evicted, "evicted least recently used entry");
                }
                None => {
                    return Err(CacheError::Backend(
                        "Cache is full and eviction failed".to_string(),
                    ))
                }
            }
        }

        state
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl_seconds));
        state.lru.touch(key);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.state.write().await.drop_entry(key);
        Ok(())
    }
}
