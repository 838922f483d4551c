//! Stateful request handles: dispatch, de-duplication, cancellation.

use crate::descriptor::RequestDescriptor;
use crate::error::{FetchError, HttpError, RequestSnapshot};
use crate::response::{ResponseData, ResultType};
use crate::stages::{DispatchContext, StageChain};
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// In-flight or settled dispatch, shareable across concurrent callers.
type SharedDispatch = Shared<BoxFuture<'static, Result<ResponseData, HttpError>>>;

struct HandleState {
    cache: Option<SharedDispatch>,
    cancel: CancellationToken,
}

/// Stateful wrapper around a descriptor that owns dispatch caching and
/// cancellation.
///
/// Lifecycle: idle (no cache) → in-flight (cache holds a pending result)
/// → settled (cache holds the completed result, success or failure) →
/// idle again on [`reset`](Self::reset)/[`abort`](Self::abort).
///
/// Concurrent [`fetch`](Self::fetch) calls while in-flight or settled
/// observe the same shared outcome; at most one physical network
/// operation is in progress per handle. The cacheable flag governs only
/// what happens on settle: a cacheable handle keeps the settled result,
/// a non-cacheable handle drops it so the next call dispatches fresh.
pub struct RequestHandle {
    id: String,
    descriptor: RequestDescriptor,
    chain: StageChain,
    result_type: ResultType,
    timeout: Option<Duration>,
    state: Mutex<HandleState>,
}

impl RequestHandle {
    #[must_use]
    pub fn new(
        descriptor: RequestDescriptor,
        chain: StageChain,
        result_type: ResultType,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            descriptor,
            chain,
            result_type,
            timeout,
            state: Mutex::new(HandleState {
                cache: None,
                cancel: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Composite identity key: `method + resolved URL`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{} {}", self.descriptor.method(), self.descriptor.full_url())
    }

    /// Diagnostic snapshot of this handle's request (id, url, method,
    /// stringified body). Attached to every normalized error.
    #[must_use]
    pub fn snapshot(&self) -> RequestSnapshot {
        RequestSnapshot {
            id: self.id.clone(),
            url: self.descriptor.full_url().to_owned(),
            method: self.descriptor.method().to_string(),
            body: self
                .descriptor
                .options()
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Dispatch the request, de-duplicating concurrent calls.
    ///
    /// The in-flight future is always shared, so concurrent calls ride
    /// one physical network operation regardless of cacheability. For a
    /// cacheable descriptor the settled result (success or failure) then
    /// stays cached until [`reset`](Self::reset); for a non-cacheable
    /// one the slot is dropped on settle, so the next call dispatches
    /// fresh.
    ///
    /// # Errors
    ///
    /// Any failure surfaces as a normalized [`HttpError`]; errors already
    /// normalized deeper in the chain pass through unwrapped.
    pub async fn fetch(&self) -> Result<ResponseData, HttpError> {
        let dispatch = {
            let mut state = self.state.lock();
            if let Some(cached) = &state.cache {
                cached.clone()
            } else {
                let dispatch = self.dispatch(state.cancel.clone());
                state.cache = Some(dispatch.clone());
                dispatch
            }
        };
        let result = dispatch.clone().await;
        if !self.descriptor.cacheable() {
            let mut state = self.state.lock();
            // Drop only our own settled dispatch; an abort may already
            // have re-armed the slot with a newer one
            if state.cache.as_ref().is_some_and(|c| c.ptr_eq(&dispatch)) {
                state.cache = None;
            }
        }
        result
    }

    /// Fetch and return the payload as text.
    ///
    /// # Errors
    /// Normalized [`HttpError`]; code `EDECODE` when the settled payload
    /// has a different shape.
    pub async fn text(&self) -> Result<String, HttpError> {
        let data = self.fetch().await?;
        data.payload
            .into_text()
            .ok_or_else(|| self.shape_error("text"))
    }

    /// Fetch and return the payload as a JSON value.
    ///
    /// # Errors
    /// Normalized [`HttpError`]; code `EDECODE` on shape mismatch.
    pub async fn json(&self) -> Result<serde_json::Value, HttpError> {
        let data = self.fetch().await?;
        data.payload
            .into_json()
            .ok_or_else(|| self.shape_error("json"))
    }

    /// Fetch and return the payload as raw bytes.
    ///
    /// # Errors
    /// Normalized [`HttpError`]; code `EDECODE` on shape mismatch.
    pub async fn bytes(&self) -> Result<Bytes, HttpError> {
        let data = self.fetch().await?;
        data.payload
            .into_bytes()
            .ok_or_else(|| self.shape_error("bytes"))
    }

    /// Fetch and return the payload as a binary blob.
    ///
    /// # Errors
    /// Normalized [`HttpError`]; code `EDECODE` on shape mismatch.
    pub async fn blob(&self) -> Result<Bytes, HttpError> {
        self.bytes().await
    }

    /// Fetch and return the payload as URL-encoded form pairs.
    ///
    /// # Errors
    /// Normalized [`HttpError`]; code `EDECODE` on shape mismatch.
    pub async fn form(&self) -> Result<Vec<(String, String)>, HttpError> {
        let data = self.fetch().await?;
        data.payload
            .into_form()
            .ok_or_else(|| self.shape_error("form"))
    }

    /// Cancel any in-flight operation and clear the cached result,
    /// returning the handle to idle. The next [`fetch`](Self::fetch)
    /// starts fresh. Cancellation of the underlying transport is
    /// best-effort; its eventual result is ignored.
    ///
    /// Aborting does not evict the handle from any owning identity map;
    /// use the owner's release operation for that.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.cancel.cancel();
        // Re-arm so the handle can dispatch again
        state.cancel = CancellationToken::new();
        state.cache = None;
        tracing::debug!(target: "fetchplan::handle", id = %self.id, "handle aborted");
    }

    /// Alias for [`abort`](Self::abort): clears the cache and cancels any
    /// in-flight operation unconditionally.
    pub fn reset(&self) {
        self.abort();
    }

    /// Whether a result (pending or settled) is currently cached.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.lock().cache.is_some()
    }

    fn dispatch(&self, cancel: CancellationToken) -> SharedDispatch {
        let descriptor = self.descriptor.clone();
        let chain = self.chain.clone();
        let snapshot = self.snapshot();
        let ctx = DispatchContext {
            snapshot: snapshot.clone(),
            result_type: self.result_type,
            timeout: self.timeout,
            cancel,
        };

        async move {
            tracing::debug!(
                target: "fetchplan::handle",
                id = %ctx.snapshot.id,
                method = %ctx.snapshot.method,
                url = %ctx.snapshot.url,
                "dispatching request"
            );
            match run_chain(&descriptor, &chain, &ctx).await {
                Ok(data) => {
                    tracing::debug!(
                        target: "fetchplan::handle",
                        id = %ctx.snapshot.id,
                        status = %data.status(),
                        "request settled"
                    );
                    Ok(data)
                }
                Err(err) => {
                    let normalized = HttpError::normalize(err, snapshot);
                    tracing::warn!(
                        target: "fetchplan::handle",
                        id = %normalized.request.id,
                        code = %normalized.code,
                        "request failed"
                    );
                    Err(normalized)
                }
            }
        }
        .boxed()
        .shared()
    }

    fn shape_error(&self, expected: &'static str) -> HttpError {
        HttpError {
            id: self.id.clone(),
            status: None,
            code: "EDECODE".to_owned(),
            message: format!("settled payload is not {expected}"),
            cause: None,
            request: self.snapshot(),
        }
    }
}

/// One pass through the stage chain: pre-process, mutate options, fetch,
/// decode, post-process.
async fn run_chain(
    descriptor: &RequestDescriptor,
    chain: &StageChain,
    ctx: &DispatchContext,
) -> Result<ResponseData, FetchError> {
    let options = descriptor.pre_process(descriptor.options().clone());
    let options = chain.run_mutate(ctx, options).await?;
    let response = chain.run_fetch(ctx, &options).await?;
    let payload = chain.run_decode(ctx, &response).await?;
    let payload = descriptor.post_process(payload);
    Ok(ResponseData { response, payload })
}

impl std::fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        write!(
            f,
            "{} {} (id={}, body={})",
            snapshot.method,
            snapshot.url,
            snapshot.id,
            snapshot.body.as_deref().unwrap_or("-")
        )
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("key", &self.key())
            .field("armed", &self.is_armed())
            .finish()
    }
}
