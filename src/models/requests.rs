//! Request DTOs for the HTTP surface
//!
//! Defines the structure of incoming query strings.

use serde::Deserialize;

/// Query string of the media proxy (GET /proxy?url=...)
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyQuery {
    /// Absolute upstream URL of the media to relay
    pub url: String,
}

impl ProxyQuery {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.url.trim().is_empty() {
            return Some("url cannot be empty".to_string());
        }
        None
    }
}
