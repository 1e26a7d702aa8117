//! Generic cache container with coalescing and background recomputation
//!
//! One container holds the computed snapshots of one data family
//! (permissions or meta) for one holder, keyed by `QueryOptions`. The state
//! per key is a value plus an optional in-flight computation:
//!
//! - `get` serves the cached value, joins an in-flight computation, or
//!   computes synchronously; concurrent misses coalesce onto one
//!   computation.
//! - `recalculate` recomputes in the background while the stale value stays
//!   visible, then swaps atomically.
//! - `reload` removes visibility immediately; readers await the pending
//!   computation instead of seeing stale data.
//! - A failed recomputation never corrupts the cache: `recalculate` keeps
//!   the previous value, `reload` leaves the key absent and fails the
//!   returned future.

use crate::error::{EngineError, Result};
use crate::query::QueryOptions;
use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes a fresh snapshot for a query. Implementations are pure
/// functions of the holder's current node state.
pub trait Loader<T>: Send + Sync + 'static {
    fn load(&self, query: &QueryOptions) -> Result<T>;
}

type ComputeResult<T> = std::result::Result<Arc<T>, Arc<EngineError>>;
type Inflight<T> = Shared<BoxFuture<'static, ComputeResult<T>>>;

struct Entry<T> {
    value: Option<Arc<T>>,
    inflight: Option<(u64, Inflight<T>)>,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            value: None,
            inflight: None,
        }
    }
}

struct Inner<T: Send + Sync + 'static> {
    loader: Arc<dyn Loader<T>>,
    entries: Mutex<HashMap<QueryOptions, Entry<T>>>,
    recent: Mutex<Option<(QueryOptions, Arc<T>)>>,
    generation: AtomicU64,
}

/// Per-holder cache of computed data, keyed by query options.
pub struct Container<T: Send + Sync + 'static> {
    inner: Arc<Inner<T>>,
}

enum MissAction<T: Send + Sync + 'static> {
    Hit(Arc<T>),
    Join(Inflight<T>),
    Compute {
        generation: u64,
        tx: oneshot::Sender<ComputeResult<T>>,
    },
}

impl<T: Send + Sync + 'static> Container<T> {
    pub fn new(loader: Arc<dyn Loader<T>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                entries: Mutex::new(HashMap::new()),
                recent: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Returns the cached value, computing it if absent. Concurrent calls
    /// for the same missing key coalesce onto a single computation.
    pub async fn get(&self, query: &QueryOptions) -> Result<Arc<T>> {
        if let Some((recent_query, value)) = &*self.inner.recent.lock() {
            if recent_query == query {
                return Ok(value.clone());
            }
        }

        let action = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(query.clone()).or_default();
            if let Some(value) = &entry.value {
                MissAction::Hit(value.clone())
            } else if let Some((_, inflight)) = &entry.inflight {
                MissAction::Join(inflight.clone())
            } else {
                let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<ComputeResult<T>>();
                entry.inflight = Some((generation, share_receiver(rx)));
                MissAction::Compute { generation, tx }
            }
        };

        match action {
            MissAction::Hit(value) => {
                self.inner.offer_recent(query, &value);
                Ok(value)
            }
            MissAction::Join(inflight) => inflight.await.map_err(shared_error),
            MissAction::Compute { generation, tx } => {
                debug!("cache miss, computing");
                let result = self
                    .inner
                    .loader
                    .load(query)
                    .map(Arc::new)
                    .map_err(Arc::new);
                self.inner.commit(query, generation, &result);
                let _ = tx.send(result.clone());
                let value = result.map_err(shared_error)?;
                self.inner.offer_recent(query, &value);
                Ok(value)
            }
        }
    }

    /// Computes a fresh value without touching the cache
    pub fn calculate(&self, query: &QueryOptions) -> Result<T> {
        self.inner.loader.load(query)
    }

    /// Recomputes in the background; the previous value stays visible until
    /// the new one is ready. Returns immediately.
    pub fn recalculate(&self, query: &QueryOptions) {
        self.inner.clear_recent();
        let inner = self.inner.clone();
        let query = query.clone();
        tokio::spawn(async move {
            match inner.loader.load(&query) {
                Ok(value) => {
                    inner
                        .entries
                        .lock()
                        .entry(query)
                        .or_default()
                        .value = Some(Arc::new(value));
                    // a get may have repopulated the fast path with the
                    // stale value while we were computing
                    inner.clear_recent();
                }
                Err(err) => {
                    warn!(%err, "background recalculation failed, keeping previous value");
                }
            }
        });
    }

    /// Applies [`Self::recalculate`] to every cached key
    pub fn recalculate_all(&self) {
        for query in self.inner.cached_keys() {
            self.recalculate(&query);
        }
    }

    /// Invalidates the key immediately and computes a replacement in the
    /// background. Until the replacement is ready, `get` on this key awaits
    /// it rather than serving stale data.
    pub fn reload(&self, query: &QueryOptions) -> BoxFuture<'static, Result<Arc<T>>> {
        self.inner.clear_recent();

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel::<ComputeResult<T>>();
        let inflight = share_receiver(rx);

        {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(query.clone()).or_default();
            entry.value = None;
            entry.inflight = Some((generation, inflight.clone()));
        }

        let inner = self.inner.clone();
        let task_query = query.clone();
        tokio::spawn(async move {
            let result = inner
                .loader
                .load(&task_query)
                .map(Arc::new)
                .map_err(Arc::new);
            if result.is_err() {
                warn!("reload computation failed, leaving key absent");
            }
            inner.commit(&task_query, generation, &result);
            let _ = tx.send(result);
        });

        inflight.map(|result| result.map_err(shared_error)).boxed()
    }

    /// Reloads every cached key; resolves when all replacements are ready
    pub fn reload_all(&self) -> BoxFuture<'static, ()> {
        let pending: Vec<_> = self
            .inner
            .cached_keys()
            .iter()
            .map(|query| self.reload(query))
            .collect();
        async move {
            for fut in pending {
                let _ = fut.await;
            }
        }
        .boxed()
    }

    /// Removes one entry without scheduling recomputation
    pub fn invalidate(&self, query: &QueryOptions) {
        self.inner.clear_recent();
        self.inner.entries.lock().remove(query);
    }

    /// Removes every entry without scheduling recomputation
    pub fn invalidate_all(&self) {
        self.inner.clear_recent();
        self.inner.entries.lock().clear();
    }

    /// The values currently cached, for bulk maintenance
    pub fn cached_values(&self) -> Vec<Arc<T>> {
        self.inner
            .entries
            .lock()
            .values()
            .filter_map(|entry| entry.value.clone())
            .collect()
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    /// Commits a computation if its generation still owns the in-flight
    /// slot; invalidated keys are left absent.
    fn commit(&self, query: &QueryOptions, generation: u64, result: &ComputeResult<T>) {
        let mut entries = self.entries.lock();
        let mut remove_empty = false;
        if let Some(entry) = entries.get_mut(query) {
            if matches!(entry.inflight, Some((g, _)) if g == generation) {
                entry.inflight = None;
                match result {
                    Ok(value) => entry.value = Some(value.clone()),
                    Err(_) => remove_empty = entry.value.is_none(),
                }
            }
        }
        if remove_empty {
            entries.remove(query);
        }
    }

    fn cached_keys(&self) -> Vec<QueryOptions> {
        self.entries.lock().keys().cloned().collect()
    }

    fn offer_recent(&self, query: &QueryOptions, value: &Arc<T>) {
        *self.recent.lock() = Some((query.clone(), value.clone()));
    }

    fn clear_recent(&self) {
        *self.recent.lock() = None;
    }
}

fn share_receiver<T: Send + Sync + 'static>(
    rx: oneshot::Receiver<ComputeResult<T>>,
) -> Inflight<T> {
    rx.map(|received| match received {
        Ok(result) => result,
        Err(_) => Err(Arc::new(EngineError::Recompute(
            "computation interrupted".to_string(),
        ))),
    })
    .boxed()
    .shared()
}

fn shared_error(err: Arc<EngineError>) -> EngineError {
    EngineError::Recompute(err.to_string())
}
