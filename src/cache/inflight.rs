//! In-Flight Registry Module
//!
//! Single-flight de-duplication: while a computation for a key is running,
//! later callers for the same key join it instead of starting their own.
//!
//! # Scope
//! De-duplication is per process. Two replicas of the service can compute
//! the same key at the same time; cluster-wide single-flight needs a
//! distributed lock, which this module does not provide.
//!
//! # Lifecycle
//! The membership check and the registration of a shared receiver happen in
//! one critical section. The caller's `compute` runs after the lock is
//! released, so it may freely call back into the registry. The computation
//! is spawned onto the Tokio runtime together with a guard that clears the
//! slot when it settles, whether it succeeded, failed or panicked. Dropping
//! every waiter does not cancel the computation.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::cache::CacheKey;
use crate::error::{CacheError, Result};

type SharedValue = Arc<dyn Any + Send + Sync>;
type Outcome = std::result::Result<SharedValue, CacheError>;
type SharedComputation = Shared<BoxFuture<'static, Outcome>>;
type PendingMap = Arc<Mutex<HashMap<CacheKey, SharedComputation>>>;

// == In-Flight Registry ==
/// Process-local map from cache key to the computation producing it.
///
/// Cloning shares the same map.
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    pending: PendingMap,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // == Deduplicate ==
    /// Joins the running computation for `key`, or starts `compute` if
    /// there is none. All joined callers get the same value or error.
    ///
    /// Registration happens before this returns; the returned future only
    /// waits.
    pub fn deduplicate<T, F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> impl Future<Output = Result<T>> + Send + 'static
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.begin(key, compute).wait()
    }

    // == Begin ==
    /// Like [`deduplicate`](Self::deduplicate), but returns the flight
    /// before awaiting it so the caller can see whether it joined.
    pub fn begin<T, F, Fut>(&self, key: &CacheKey, compute: F) -> Flight<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (sender, computation) = {
            let mut pending = lock(&self.pending);

            if let Some(existing) = pending.get(key) {
                debug!(key = %key, "joining in-flight computation");
                return Flight::new(existing.clone(), key.clone(), true);
            }

            let (sender, receiver) = oneshot::channel::<Outcome>();
            let computation = receiver
                .map(|received| match received {
                    Ok(outcome) => outcome,
                    Err(oneshot::Canceled) => Err(CacheError::Internal(
                        "computation did not complete".to_string(),
                    )),
                })
                .boxed()
                .shared();

            pending.insert(key.clone(), computation.clone());
            (sender, computation)
        };

        // Created before `compute` runs so a panic there still frees the slot.
        let slot = SlotGuard {
            pending: Arc::clone(&self.pending),
            key: key.clone(),
            sender: Some(sender),
        };
        let future = compute();
        tokio::spawn(async move {
            let outcome = future.await.map(|value| Arc::new(value) as SharedValue);
            slot.settle(outcome);
        });

        debug!(key = %key, "started computation");
        Flight::new(computation, key.clone(), false)
    }

    /// Number of computations currently running.
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.pending).is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        lock(&self.pending).contains_key(key)
    }
}

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<CacheKey, SharedComputation>> {
    // Insert, remove and lookup never leave the map half-updated.
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns a registered slot until its computation settles.
///
/// Dropping an unsettled guard (panic or runtime shutdown) clears the slot
/// and drops the sender, so waiters see `Internal` instead of hanging.
struct SlotGuard {
    pending: PendingMap,
    key: CacheKey,
    sender: Option<oneshot::Sender<Outcome>>,
}

impl SlotGuard {
    /// Clears the slot, then hands `outcome` to every waiter.
    fn settle(mut self, outcome: Outcome) {
        lock(&self.pending).remove(&self.key);
        if let Some(sender) = self.sender.take() {
            // No receiver left only if every waiter was dropped.
            let _ = sender.send(outcome);
        }
        debug!(key = %self.key, "computation settled, slot cleared");
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.sender.is_some() {
            lock(&self.pending).remove(&self.key);
            warn!(key = %self.key, "computation abandoned, slot cleared");
        }
    }
}

// == Flight ==
/// A handle on a started or joined computation.
pub struct Flight<T> {
    computation: SharedComputation,
    key: CacheKey,
    joined: bool,
    _value: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Flight<T> {
    fn new(computation: SharedComputation, key: CacheKey, joined: bool) -> Self {
        Self {
            computation,
            key,
            joined,
            _value: PhantomData,
        }
    }

    /// True if this caller joined a computation someone else started.
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Waits for the computation to settle.
    pub async fn wait(self) -> Result<T> {
        let value = self.computation.await?;
        match value.downcast_ref::<T>() {
            Some(value) => Ok(value.clone()),
            None => {
                warn!(key = %self.key, "in-flight value has a different type than requested");
                Err(CacheError::Internal(format!(
                    "in-flight value for '{}' has a different type than requested",
                    self.key
                )))
            }
        }
    }
}
