//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;

use crate::cache::DEFAULT_TTL_SECONDS;
use crate::error::{CacheError, Result};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the in-memory backend can hold
    pub max_entries: usize,
    /// TTL in seconds for writes that do not ask for one
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// How long a proxy caller waits before getting a timeout
    pub proxy_deadline_ms: u64,
    /// Hard limit on a single upstream fetch
    pub origin_timeout_ms: u64,
    /// Hosts the media proxy may fetch from; empty allows any public host
    pub allowed_hosts: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 1)
    /// - `PROXY_DEADLINE_MS` - Proxy caller deadline (default: 5000)
    /// - `ORIGIN_TIMEOUT_MS` - Upstream request timeout (default: 15000)
    /// - `PROXY_ALLOWED_HOSTS` - Comma-separated host allow-list (default: any public host)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            proxy_deadline_ms: env_or("PROXY_DEADLINE_MS", defaults.proxy_deadline_ms),
            origin_timeout_ms: env_or("ORIGIN_TIMEOUT_MS", defaults.origin_timeout_ms),
            allowed_hosts: env::var("PROXY_ALLOWED_HOSTS")
                .map(|v| parse_host_list(&v))
                .unwrap_or(defaults.allowed_hosts),
        }
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.max_entries == 0, "MAX_ENTRIES must be positive"),
            (self.default_ttl == 0, "DEFAULT_TTL must be positive"),
            (self.cleanup_interval == 0, "CLEANUP_INTERVAL must be positive"),
            (self.proxy_deadline_ms == 0, "PROXY_DEADLINE_MS must be positive"),
            (self.origin_timeout_ms == 0, "ORIGIN_TIMEOUT_MS must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(CacheError::InvalidRequest(message.to_string())),
            None => Ok(()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: DEFAULT_TTL_SECONDS,
            server_port: 3000,
            cleanup_interval: 1,
            proxy_deadline_ms: 5000,
            origin_timeout_ms: 15_000,
            allowed_hosts: Vec::new(),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_host_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}
