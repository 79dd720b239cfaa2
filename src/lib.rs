//! Cache-Aside - request de-duplicating cache layer
//!
//! Wraps expensive lookups (database queries, upstream fetches) so that
//! repeated calls are served from a TTL cache and concurrent misses for the
//! same key run the lookup only once. Ships with an in-memory backend and a
//! caching media proxy server.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod tasks;

pub use api::AppState;
pub use cache::{build_key, CacheCoordinator, CacheKey, FetchOptions, Params};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
