//! Backend doubles for unit tests.

use async_trait::async_trait;

use crate::cache::KvBackend;
use crate::error::{CacheError, Result};

/// A backend whose every operation fails, as during a store outage.
pub struct FailingBackend;

#[async_trait]
impl KvBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl_seconds: u64) -> Result<()> {
        Err(CacheError::Backend("connection refused".to_string()))
    }

    async fn del(&self, _key: &str) -> Result<()> {
        Err(CacheError::Backend("connection refused".to_string()))
    }
}
