//! Expiry Sweep Task
//!
//! Reads already treat expired entries as misses; the sweep frees the
//! memory of entries nobody reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::MemoryBackend;

/// Spawns a task that sweeps expired entries every `cleanup_interval_secs`.
///
/// The returned handle is aborted on shutdown.
pub fn spawn_cleanup_task(backend: Arc<MemoryBackend>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = backend.cleanup_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KvBackend;

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let backend = Arc::new(MemoryBackend::new(100));
        backend
            .set("expire_soon", "v".to_string(), 1)
            .await
            .unwrap();

        let handle = spawn_cleanup_task(backend.clone(), 1);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        // len() does not expire entries on its own.
        assert_eq!(backend.len().await, 0);
        assert_eq!(backend.stats().await.expirations, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_preserves_valid_entries() {
        let backend = Arc::new(MemoryBackend::new(100));
        backend
            .set("long_lived", "v".to_string(), 3600)
            .await
            .unwrap();

        let handle = spawn_cleanup_task(backend.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        assert_eq!(backend.get("long_lived").await.unwrap().as_deref(), Some("v"));

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_can_be_aborted() {
        let handle = spawn_cleanup_task(Arc::new(MemoryBackend::new(10)), 1);

        handle.abort();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
