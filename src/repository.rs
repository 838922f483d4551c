//! Value-level caching: single-value loaders and parameterized
//! repositories.
//!
//! A [`Loader`] memoizes one async load; a [`Repository`] keeps one
//! loader per parameter set. Unlike a [`RequestHandle`], which caches
//! settled failures until reset, a loader drops a failed result so the
//! next fetch retries.

use crate::error::HttpError;
use crate::handle::RequestHandle;
use crate::params::Params;
use crate::response::ResponseData;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Producer of the value a [`Loader`] caches.
pub type LoadFn<T> = dyn Fn() -> BoxFuture<'static, Result<T, HttpError>> + Send + Sync;

type SharedLoad<T> = Shared<BoxFuture<'static, Result<T, HttpError>>>;

struct LoaderState<T: Clone> {
    cache: Option<SharedLoad<T>>,
    // Bumped on every reset so a stale failure cannot clear a newer load
    generation: u64,
}

/// Memoizing async loader.
///
/// The first [`fetch`](Self::fetch) starts the load; concurrent callers
/// share the in-flight future. A successful value stays cached until
/// [`reset`](Self::reset). A failure is returned to every waiter and
/// then dropped from the cache, so the next fetch starts over.
pub struct Loader<T: Clone + Send + 'static> {
    load: Arc<LoadFn<T>>,
    state: Mutex<LoaderState<T>>,
}

impl<T: Clone + Send + 'static> Loader<T> {
    pub fn new(load: impl Fn() -> BoxFuture<'static, Result<T, HttpError>> + Send + Sync + 'static) -> Self {
        Self {
            load: Arc::new(load),
            state: Mutex::new(LoaderState {
                cache: None,
                generation: 0,
            }),
        }
    }

    /// Return the cached value, awaiting the in-flight load when one is
    /// running, or start a fresh load.
    ///
    /// # Errors
    ///
    /// Propagates the load's [`HttpError`]; the failed result is evicted
    /// before returning.
    pub async fn fetch(&self) -> Result<T, HttpError> {
        let (load, generation) = {
            let mut state = self.state.lock();
            match &state.cache {
                Some(cached) => (cached.clone(), state.generation),
                None => {
                    let load = (self.load)().shared();
                    state.cache = Some(load.clone());
                    (load, state.generation)
                }
            }
        };

        let result = load.await;
        if result.is_err() {
            let mut state = self.state.lock();
            // Bumping here keeps a second waiter on the same failed load
            // from evicting a newer load started by a retrying caller
            if state.generation == generation {
                state.cache = None;
                state.generation += 1;
            }
        }
        result
    }

    /// Drop the cached value (or in-flight load); the next fetch reloads.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cache = None;
        state.generation += 1;
    }

    /// Whether a value (pending or settled) is currently cached.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.lock().cache.is_some()
    }
}

impl Loader<ResponseData> {
    /// Loader backed by a [`RequestHandle`] dispatch.
    ///
    /// The handle keeps its own settled-failure cache; this wrapper's
    /// retry-on-failure semantics only apply to the loader's value cache.
    #[must_use]
    pub fn from_handle(handle: Arc<RequestHandle>) -> Self {
        Self::new(move || {
            let handle = Arc::clone(&handle);
            async move { handle.fetch().await }.boxed()
        })
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// Factory producing a [`Loader`] for a given parameter set.
pub type MakeLoader<T> = dyn Fn(&Params) -> Loader<T> + Send + Sync;

/// Keyed collection of [`Loader`]s, one per distinct parameter set.
///
/// Loaders are created lazily on first fetch and retained so repeated
/// fetches with the same parameters hit the same cache.
pub struct Repository<T: Clone + Send + 'static> {
    make: Arc<MakeLoader<T>>,
    loaders: Mutex<HashMap<String, Arc<Loader<T>>>>,
}

impl<T: Clone + Send + 'static> Repository<T> {
    pub fn new(make: impl Fn(&Params) -> Loader<T> + Send + Sync + 'static) -> Self {
        Self {
            make: Arc::new(make),
            loaders: Mutex::new(HashMap::new()),
        }
    }

    /// Canonical cache key for a parameter set: `k:v` pairs in key order,
    /// comma-separated.
    #[must_use]
    pub fn cache_key(params: &Params) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Fetch the value for `params`, creating its loader on first use.
    ///
    /// # Errors
    ///
    /// Propagates the loader's [`HttpError`].
    pub async fn fetch(&self, params: &Params) -> Result<T, HttpError> {
        let loader = {
            let key = Self::cache_key(params);
            let mut loaders = self.loaders.lock();
            let loader = loaders.entry(key.clone()).or_insert_with(|| {
                tracing::debug!(target: "fetchplan::repository", %key, "creating loader");
                Arc::new((self.make)(params))
            });
            Arc::clone(loader)
        };
        loader.fetch().await
    }

    /// Reset one parameter set's loader, or every loader when `params`
    /// is `None`. Loaders stay registered; only their caches drop.
    pub fn reset(&self, params: Option<&Params>) {
        let loaders = self.loaders.lock();
        match params {
            Some(params) => {
                if let Some(loader) = loaders.get(&Self::cache_key(params)) {
                    loader.reset();
                }
            }
            None => {
                for loader in loaders.values() {
                    loader.reset();
                }
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaders.lock().is_empty()
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("loaders", &self.loaders.lock().len())
            .finish_non_exhaustive()
    }
}
