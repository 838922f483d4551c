//! Endpoints: descriptor factories with a shared handle identity map.

use crate::descriptor::{DescriptorPatch, RequestDescriptor};
use crate::error::FetchError;
use crate::handle::RequestHandle;
use crate::response::ResultType;
use crate::stages::StageChain;
use http::Method;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Custom identity function for handles minted by an [`Endpoint`].
///
/// Defaults to `method + resolved URL` when not supplied.
pub type KeyFn = dyn Fn(&RequestDescriptor) -> String + Send + Sync;

/// Factory for [`RequestHandle`]s derived from a shared base descriptor.
///
/// Two requests that map to the same identity key receive the same
/// `Arc<RequestHandle>`, so their dispatches de-duplicate and share the
/// cached result. Handles stay in the map until
/// [`release`](Self::release) or [`clear`](Self::clear).
pub struct Endpoint {
    base: RequestDescriptor,
    chain: StageChain,
    result_type: ResultType,
    timeout: Option<Duration>,
    key_fn: Option<Arc<KeyFn>>,
    handles: Mutex<HashMap<String, Arc<RequestHandle>>>,
}

impl Endpoint {
    /// Build an endpoint over an explicit stage chain.
    #[must_use]
    pub fn new(base: RequestDescriptor, chain: StageChain) -> Self {
        Self {
            base,
            chain,
            result_type: ResultType::default(),
            timeout: None,
            key_fn: None,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Build an endpoint with the standard chain (fetch, status check,
    /// payload extraction) wired to the descriptor's own fetch primitive.
    ///
    /// # Errors
    ///
    /// [`FetchError::Configuration`] when `base` carries no fetch
    /// primitive.
    pub fn with_fetch(base: RequestDescriptor) -> Result<Self, FetchError> {
        let fetch_fn = base
            .fetch_fn()
            .cloned()
            .ok_or_else(|| FetchError::Configuration("descriptor has no fetch function".to_owned()))?;
        Ok(Self::new(base, StageChain::standard(fetch_fn)))
    }

    #[must_use]
    pub fn result_type(mut self, result_type: ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override how handles are keyed in the identity map.
    #[must_use]
    pub fn key_fn(mut self, key_fn: impl Fn(&RequestDescriptor) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Arc::new(key_fn));
        self
    }

    /// Derive a descriptor from the base and return the handle for its
    /// identity key, minting one when none exists yet.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`RequestDescriptor::copy`].
    pub fn request(
        &self,
        method: Method,
        mut patch: DescriptorPatch,
    ) -> Result<Arc<RequestHandle>, FetchError> {
        patch.method = Some(method);
        let descriptor = self.base.copy(patch)?;
        let key = match &self.key_fn {
            Some(key_fn) => key_fn(&descriptor),
            None => format!("{} {}", descriptor.method(), descriptor.full_url()),
        };

        let mut handles = self.handles.lock();
        let handle = handles.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(target: "fetchplan::endpoint", %key, "minting handle");
            Arc::new(RequestHandle::new(
                descriptor,
                self.chain.clone(),
                self.result_type,
                self.timeout,
            ))
        });
        Ok(Arc::clone(handle))
    }

    /// # Errors
    /// Same failure modes as [`Self::request`].
    pub fn get(&self, patch: DescriptorPatch) -> Result<Arc<RequestHandle>, FetchError> {
        self.request(Method::GET, patch)
    }

    /// # Errors
    /// Same failure modes as [`Self::request`].
    pub fn post(&self, patch: DescriptorPatch) -> Result<Arc<RequestHandle>, FetchError> {
        self.request(Method::POST, patch)
    }

    /// # Errors
    /// Same failure modes as [`Self::request`].
    pub fn put(&self, patch: DescriptorPatch) -> Result<Arc<RequestHandle>, FetchError> {
        self.request(Method::PUT, patch)
    }

    /// # Errors
    /// Same failure modes as [`Self::request`].
    pub fn patch(&self, patch: DescriptorPatch) -> Result<Arc<RequestHandle>, FetchError> {
        self.request(Method::PATCH, patch)
    }

    /// # Errors
    /// Same failure modes as [`Self::request`].
    pub fn delete(&self, patch: DescriptorPatch) -> Result<Arc<RequestHandle>, FetchError> {
        self.request(Method::DELETE, patch)
    }

    /// Abort and evict the handle for `key`, returning it when present.
    /// Existing clones of the `Arc` remain usable; the endpoint simply
    /// stops handing it out.
    pub fn release(&self, key: &str) -> Option<Arc<RequestHandle>> {
        let removed = self.handles.lock().remove(key);
        if let Some(handle) = &removed {
            handle.abort();
        }
        removed
    }

    /// Abort and evict every handle.
    pub fn clear(&self) {
        let mut handles = self.handles.lock();
        for handle in handles.values() {
            handle.abort();
        }
        handles.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    #[must_use]
    pub fn base(&self) -> &RequestDescriptor {
        &self.base
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("base", &self.base)
            .field("handles", &self.handles.lock().len())
            .finish_non_exhaustive()
    }
}
