//! Media Proxy Module
//!
//! Caching proxy for remote posters, banners and thumbnails. Each upstream
//! URL is fetched at most once at a time, cached with its content type,
//! and raced against a fixed deadline. A caller that hits the deadline gets
//! a timeout, while the fetch keeps going and fills the cache for the next
//! request.

mod origin;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{base64_bytes, build_key, CacheCoordinator, FetchOptions, Params};
use crate::config::Config;
use crate::error::{CacheError, Result};

pub use origin::{
    HttpOrigin, Origin, OriginResponse, FALLBACK_CONTENT_TYPE, MAX_CONTENT_TYPE_LENGTH,
    MAX_MEDIA_BYTES,
};

/// Cache namespace for proxied media.
pub const PROXY_NAMESPACE: &str = "media-proxy";

/// Content type prefixes the proxy is willing to relay.
const MEDIA_TYPE_PREFIXES: [&str; 4] = ["image/", "video/", "audio/", FALLBACK_CONTENT_TYPE];

// == Cached Media ==
/// Stored form of a proxied payload. The body is base64 in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMedia {
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
}

// == Media Proxy ==
pub struct MediaProxy {
    coordinator: Arc<CacheCoordinator>,
    origin: Arc<dyn Origin>,
    deadline: Duration,
    allowed_hosts: Vec<String>,
}

impl MediaProxy {
    pub fn new(
        coordinator: Arc<CacheCoordinator>,
        origin: Arc<dyn Origin>,
        deadline: Duration,
        allowed_hosts: Vec<String>,
    ) -> Self {
        Self {
            coordinator,
            origin,
            deadline,
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|host| host.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn from_config(
        coordinator: Arc<CacheCoordinator>,
        origin: Arc<dyn Origin>,
        config: &Config,
    ) -> Self {
        Self::new(
            coordinator,
            origin,
            Duration::from_millis(config.proxy_deadline_ms),
            config.allowed_hosts.clone(),
        )
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    // == Validate URL ==
    /// Accepts absolute http(s) URLs, restricted to the allow-list when one
    /// is configured. Without an allow-list, loopback, private and
    /// link-local addresses are refused.
    pub fn validate_url(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw)
            .map_err(|err| CacheError::InvalidRequest(format!("Invalid url '{}': {}", raw, err)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(CacheError::InvalidRequest(format!(
                "Unsupported url scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| CacheError::InvalidRequest("Url has no host".to_string()))?
            .to_ascii_lowercase();

        if self.allowed_hosts.is_empty() {
            if is_internal_host(&host) {
                return Err(CacheError::InvalidRequest(format!(
                    "Host '{}' is not publicly routable",
                    host
                )));
            }
        } else if !self.allowed_hosts.contains(&host) {
            return Err(CacheError::InvalidRequest(format!(
                "Host '{}' is not allowed",
                host
            )));
        }

        Ok(url)
    }

    // == Fetch ==
    /// Returns the media at `raw_url`, from cache when possible.
    pub async fn fetch(&self, raw_url: &str) -> Result<CachedMedia> {
        let url = self.validate_url(raw_url)?;
        let key = build_key(PROXY_NAMESPACE, &Params::new().with("url", url.as_str()))?;

        let origin = Arc::clone(&self.origin);
        let pending = self.coordinator.get_cached_or_fetch(
            &key,
            move || async move {
                let response = origin.fetch(&url).await?;
                if response.body.len() > MAX_MEDIA_BYTES {
                    anyhow::bail!(
                        "upstream {} body of {} bytes exceeds the {} byte limit",
                        url,
                        response.body.len(),
                        MAX_MEDIA_BYTES
                    );
                }
                if response.content_type.len() > MAX_CONTENT_TYPE_LENGTH
                    || !is_media_type(&response.content_type)
                {
                    anyhow::bail!(
                        "upstream {} returned non-media content type '{}'",
                        url,
                        response.content_type
                    );
                }
                Ok(CachedMedia {
                    content_type: response.content_type,
                    body: response.body,
                })
            },
            FetchOptions::default(),
        );

        match tokio::time::timeout(self.deadline, pending).await {
            Ok(result) => {
                debug!(key = %key, "proxy request served");
                result
            }
            Err(_) => {
                let deadline_ms = self.deadline.as_millis() as u64;
                warn!(key = %key, deadline_ms, "proxy deadline elapsed, fetch continues in background");
                Err(CacheError::Timeout(deadline_ms))
            }
        }
    }
}

/// Hostnames and IP literals that point back into the local network.
///
/// Only literals are checked; names resolving to internal addresses need an
/// allow-list.
fn is_internal_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    match literal.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => is_internal_v4(ip),
        Ok(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
            Some(mapped) => is_internal_v4(mapped),
            None => {
                let first = ip.segments()[0];
                ip.is_loopback()
                    || ip.is_unspecified()
                    || (first & 0xfe00) == 0xfc00 // unique local
                    || (first & 0xffc0) == 0xfe80 // link-local
            }
        },
        Err(_) => false,
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_media_type(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    MEDIA_TYPE_PREFIXES
        .iter()
        .any(|prefix| lowered.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubOrigin {
        calls: AtomicUsize,
        delay: Duration,
        content_type: &'static str,
    }

    impl StubOrigin {
        fn new(delay: Duration, content_type: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                content_type,
            })
        }
    }

    #[async_trait]
    impl Origin for StubOrigin {
        async fn fetch(&self, url: &Url) -> anyhow::Result<OriginResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(OriginResponse {
                content_type: self.content_type.to_string(),
                body: url.path().as_bytes().to_vec(),
            })
        }
    }

    fn proxy(origin: Arc<StubOrigin>, deadline_ms: u64, hosts: &[&str]) -> MediaProxy {
        let coordinator =
            Arc::new(CacheCoordinator::new(Arc::new(MemoryBackend::new(100)), 60).unwrap());
        MediaProxy::new(
            coordinator,
            origin,
            Duration::from_millis(deadline_ms),
            hosts.iter().map(|h| h.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let origin = StubOrigin::new(Duration::ZERO, "image/jpeg");
        let proxy = proxy(origin.clone(), 1000, &[]);

        let first = proxy.fetch("https://cdn.example.com/poster.jpg").await.unwrap();
        let second = proxy.fetch("https://cdn.example.com/poster.jpg").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.content_type, "image/jpeg");
        assert_eq!(first.body, b"/poster.jpg");
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_does_not_cancel_fetch() {
        let origin = StubOrigin::new(Duration::from_millis(80), "image/png");
        let proxy = proxy(origin.clone(), 10, &[]);

        let timed_out = proxy.fetch("https://cdn.example.com/banner.png").await;
        assert!(matches!(timed_out, Err(CacheError::Timeout(10))));

        tokio::time::sleep(Duration::from_millis(150)).await;

        let cached = proxy.fetch("https://cdn.example.com/banner.png").await.unwrap();
        assert_eq!(cached.body, b"/banner.png");
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_media_content_is_rejected_and_not_cached() {
        let origin = StubOrigin::new(Duration::ZERO, "text/html; charset=utf-8");
        let proxy = proxy(origin.clone(), 1000, &[]);

        for _ in 0..2 {
            let result = proxy.fetch("https://example.com/index.html").await;
            assert!(matches!(result, Err(CacheError::Compute(_))));
        }
        assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
    }

    struct SizedOrigin {
        calls: AtomicUsize,
        len: usize,
    }

    #[async_trait]
    impl Origin for SizedOrigin {
        async fn fetch(&self, _url: &Url) -> anyhow::Result<OriginResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OriginResponse {
                content_type: "video/mp4".to_string(),
                body: vec![7u8; self.len],
            })
        }
    }

    fn sized_proxy(len: usize) -> (Arc<SizedOrigin>, Arc<CacheCoordinator>, MediaProxy) {
        let origin = Arc::new(SizedOrigin {
            calls: AtomicUsize::new(0),
            len,
        });
        let coordinator =
            Arc::new(CacheCoordinator::new(Arc::new(MemoryBackend::new(10)), 60).unwrap());
        let proxy = MediaProxy::new(
            coordinator.clone(),
            origin.clone(),
            Duration::from_secs(5),
            Vec::new(),
        );
        (origin, coordinator, proxy)
    }

    #[tokio::test]
    async fn test_largest_allowed_body_is_cached() {
        let (origin, coordinator, proxy) = sized_proxy(MAX_MEDIA_BYTES);

        for _ in 0..3 {
            let media = proxy.fetch("https://cdn.example.com/trailer.mp4").await.unwrap();
            assert_eq!(media.body.len(), MAX_MEDIA_BYTES);
        }

        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().backend_errors, 0);
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let (origin, coordinator, proxy) = sized_proxy(MAX_MEDIA_BYTES + 1);

        let err = proxy
            .fetch("https://cdn.example.com/trailer.mp4")
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Compute(_)));
        assert!(err.to_string().contains("byte limit"));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().backend_errors, 0);
    }

    #[test]
    fn test_url_validation() {
        let origin = StubOrigin::new(Duration::ZERO, "image/png");
        let proxy = proxy(origin, 1000, &["CDN.example.com"]);

        assert!(proxy.validate_url("https://cdn.example.com/a.png").is_ok());
        assert!(proxy.validate_url("https://evil.example.com/a.png").is_err());
        assert!(proxy.validate_url("ftp://cdn.example.com/a.png").is_err());
        assert!(proxy.validate_url("not a url").is_err());
    }

    #[test]
    fn test_internal_addresses_rejected_without_allow_list() {
        let proxy = proxy(StubOrigin::new(Duration::ZERO, "image/png"), 1000, &[]);

        for url in [
            "http://169.254.169.254/latest/meta-data/",
            "http://127.0.0.1:8080/a.png",
            "http://2130706433/a.png",
            "http://10.0.0.5/a.png",
            "http://192.168.1.1/a.png",
            "http://0.0.0.0/a.png",
            "http://localhost/a.png",
            "http://[::1]/a.png",
            "http://[fe80::1]/a.png",
            "http://[fd00::1]/a.png",
            "http://[::ffff:127.0.0.1]/a.png",
        ] {
            let err = proxy.validate_url(url).unwrap_err();
            assert!(err.to_string().contains("publicly routable"), "{}: {}", url, err);
        }

        assert!(proxy.validate_url("https://8.8.8.8/a.png").is_ok());
        assert!(proxy.validate_url("https://cdn.example.com/a.png").is_ok());
    }

    #[test]
    fn test_allow_list_can_admit_internal_hosts() {
        let proxy = proxy(
            StubOrigin::new(Duration::ZERO, "image/png"),
            1000,
            &["127.0.0.1"],
        );
        assert!(proxy.validate_url("http://127.0.0.1/a.png").is_ok());
        assert!(proxy.validate_url("http://10.0.0.5/a.png").is_err());
    }

    #[test]
    fn test_media_type_detection() {
        assert!(is_media_type("image/webp"));
        assert!(is_media_type("Video/MP4"));
        assert!(is_media_type(FALLBACK_CONTENT_TYPE));
        assert!(!is_media_type("application/json"));
    }
}
