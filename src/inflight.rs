//! Collapses concurrent identical computations into a single execution.
//!
//! The first caller for a key starts the computation on its own task and registers it; every
//! caller arriving before it settles awaits the same shared result. Because the computation is
//! detached from its callers, dropping or timing out any caller (including the one that started
//! it) never cancels the work that other callers are waiting on.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CacheError;

/// A pending computation that any number of callers can await.
pub type InFlightResult<T> = Shared<BoxFuture<'static, Result<T, CacheError>>>;

type Registry<T> = Arc<Mutex<HashMap<String, Pending<T>>>>;

struct Pending<T> {
    /// Distinguishes this registration from a later one under the same key.
    id: u64,
    result: InFlightResult<T>,
}

/// Removes its registration when the computation's task ends, whatever the exit path.
struct EvictOnDrop<T> {
    registry: Registry<T>,
    key: String,
    id: u64,
}

impl<T> Drop for EvictOnDrop<T> {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        if registry.get(&self.key).is_some_and(|p| p.id == self.id) {
            registry.remove(&self.key);
        }
    }
}

/// Process-local registry of pending computations keyed by string.
///
/// # Example
/// ```ignore
/// let inflight: InFlight<String> = InFlight::new();
///
/// // Concurrent calls with the same key share one execution
/// let value = inflight.run("miss:weather:current:51.507:-0.128:metric", || async {
///     fetch().await
/// }).await?;
/// ```
pub struct InFlight<T> {
    registry: Registry<T>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for InFlight<T> {
    fn clone(&self) -> Self {
        InFlight {
            registry: Arc::clone(&self.registry),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for InFlight<T> {
    fn default() -> Self {
        InFlight {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `factory` for `key` unless a computation for `key` is already pending, and wait for
    /// the shared result.
    ///
    /// Failures reach every caller that joined before the computation settled. The key is
    /// evicted once it settles, so the next call after a failure starts fresh.
    pub async fn run<F, Fut>(&self, key: &str, factory: F) -> Result<T, CacheError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        self.join(key, factory).await
    }

    /// Start or join the computation for `key` without waiting for it.
    ///
    /// The computation makes progress whether or not the returned future is polled, which
    /// makes this suitable for fire-and-forget work.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn join<F, Fut>(&self, key: &str, factory: F) -> InFlightResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CacheError>> + Send + 'static,
    {
        let mut registry = self.registry.lock();

        if let Some(pending) = registry.get(key) {
            tracing::debug!("Joining in-flight computation: key={}", key);
            return pending.result.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = EvictOnDrop {
            registry: Arc::clone(&self.registry),
            key: key.to_string(),
            id,
        };

        // The factory runs on the spawned task, so nothing but the insert below happens
        // under the registry lock.
        let handle = tokio::spawn(async move {
            let _guard = guard;
            factory().await
        });

        let owned_key = key.to_string();
        let result = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(
                        "In-flight computation aborted: key={}, error={}",
                        owned_key,
                        e
                    );
                    Err(CacheError::Cancelled(owned_key))
                }
            }
        }
        .boxed()
        .shared();

        registry.insert(
            key.to_string(),
            Pending {
                id,
                result: result.clone(),
            },
        );

        result
    }

    /// Whether a computation for `key` is currently pending.
    pub fn in_flight(&self, key: &str) -> bool {
        self.registry.lock().contains_key(key)
    }

    /// Number of pending computations.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether no computation is pending.
    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }
}
