//! API Handlers
//!
//! HTTP request handlers for each endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::cache::{build_key, CacheCoordinator, MemoryBackend, Params};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{HealthResponse, InvalidateResponse, ProxyQuery, StatsResponse};
use crate::proxy::{HttpOrigin, MediaProxy, Origin};

/// Application state shared across all handlers.
///
/// Built once at startup; every handler shares the same coordinator, so
/// de-duplication spans all concurrent requests of the process.
#[derive(Clone)]
pub struct AppState {
    /// Cache-aside coordinator
    pub coordinator: Arc<CacheCoordinator>,
    /// Backend behind the coordinator, kept for sweeping and stats
    pub backend: Arc<MemoryBackend>,
    /// Media proxy built on the coordinator
    pub proxy: Arc<MediaProxy>,
    /// Value of the Cache-Control max-age sent with proxied media
    pub max_age: u64,
}

impl AppState {
    /// Creates a new AppState around the given backend and origin.
    pub fn new(backend: Arc<MemoryBackend>, origin: Arc<dyn Origin>, config: &Config) -> Result<Self> {
        let coordinator = Arc::new(CacheCoordinator::new(backend.clone(), config.default_ttl)?);
        let proxy = Arc::new(MediaProxy::from_config(coordinator.clone(), origin, config));
        Ok(Self {
            coordinator,
            backend,
            proxy,
            max_age: config.default_ttl,
        })
    }

    /// Creates a new AppState from configuration, with an HTTP origin.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let backend = Arc::new(MemoryBackend::new(config.max_entries));
        let origin = Arc::new(HttpOrigin::new(Duration::from_millis(config.origin_timeout_ms))?);
        Ok(Self::new(backend, origin, config)?)
    }
}

/// Handler for GET /proxy?url=...
///
/// Relays upstream media through the cache.
pub async fn proxy_handler(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response> {
    if let Some(error_msg) = query.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let media = state.proxy.fetch(&query.url).await?;
    let cache_control = format!("public, max-age={}", state.max_age);

    Ok((
        [
            (header::CONTENT_TYPE, media.content_type),
            (header::CACHE_CONTROL, cache_control),
        ],
        media.body,
    )
        .into_response())
}

/// Handler for DELETE /cache/:namespace
///
/// Invalidates the entry whose key is built from the namespace and the
/// query parameters.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<InvalidateResponse>> {
    let key = build_key(&namespace, &Params::from_query(params))?;
    state.coordinator.invalidate(&key).await;

    Ok(Json(InvalidateResponse::new(key.into_string())))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let cache = state.coordinator.stats();
    let backend = state.backend.stats().await;

    Json(StatsResponse::new(cache, backend))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
