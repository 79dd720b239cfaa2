//! Cache Module
//!
//! Cache-aside coordination: key building, a fail-open TTL store over a
//! pluggable key-value backend, single-flight de-duplication and the
//! coordinator tying them together.

mod backend;
mod coordinator;
mod encoding;
mod entry;
mod inflight;
mod key;
mod lru;
mod memory;
mod stats;
mod ttl_store;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export public types
pub use backend::KvBackend;
pub use coordinator::{CacheCoordinator, FetchOptions, DEFAULT_TTL_SECONDS};
pub use encoding::base64_bytes;
pub use entry::CacheEntry;
pub use inflight::{Flight, InFlightRegistry};
pub use key::{build_key, CacheKey, ParamValue, Params, Primitive, MAX_NAMESPACE_LENGTH};
pub use lru::LruTracker;
pub use memory::MemoryBackend;
pub use stats::{BackendStats, CacheStats, StatsRecorder};
pub use ttl_store::TtlStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed serialized value size in bytes
pub const MAX_VALUE_SIZE: usize = 8 * 1024 * 1024; // 8 MB
