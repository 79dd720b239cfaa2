//! Upstream origins for the media proxy.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use tracing::debug;

use crate::cache::MAX_VALUE_SIZE;

/// Content type assumed when the upstream does not send one.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Room reserved for the JSON around a cached body (field names, content type).
const ENVELOPE_BYTES: usize = 1024;

/// Largest body that still fits one cache value once base64-encoded.
pub const MAX_MEDIA_BYTES: usize = (MAX_VALUE_SIZE - ENVELOPE_BYTES) / 4 * 3;

/// Longest content type accepted, so the envelope stays within its budget.
pub const MAX_CONTENT_TYPE_LENGTH: usize = 127;

/// A fetched upstream payload.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Source of media bytes.
#[async_trait]
pub trait Origin: Send + Sync + 'static {
    async fn fetch(&self, url: &Url) -> anyhow::Result<OriginResponse>;
}

// == HTTP Origin ==
/// Fetches media over HTTP(S) with reqwest.
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
}

impl HttpOrigin {
    /// Builds a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn fetch(&self, url: &Url) -> anyhow::Result<OriginResponse> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("requesting {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("upstream {} answered {}", url, status);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();

        if let Some(length) = response.content_length() {
            if length > MAX_MEDIA_BYTES as u64 {
                bail!(
                    "upstream {} body of {} bytes exceeds the {} byte limit",
                    url,
                    length,
                    MAX_MEDIA_BYTES
                );
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("reading body of {}", url))?
        {
            if body.len() + chunk.len() > MAX_MEDIA_BYTES {
                bail!(
                    "upstream {} body exceeds the {} byte limit",
                    url,
                    MAX_MEDIA_BYTES
                );
            }
            body.extend_from_slice(&chunk);
        }

        debug!(%url, %content_type, bytes = body.len(), "fetched upstream media");
        Ok(OriginResponse { content_type, body })
    }
}
