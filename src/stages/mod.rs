//! Pluggable dispatch stages.
//!
//! A dispatch runs through an ordered [`StageChain`]. Each stage may
//! contribute to any of three capabilities:
//!
//! - option mutation before the network call ([`Stage::mutate_options`])
//! - performing the network call itself ([`Stage::perform_fetch`])
//! - decoding the raw response ([`Stage::decode_response`])
//!
//! Built-in stages:
//!
//! - [`FetchStage`] - dispatches through the injected fetch primitive,
//!   honoring timeout and cancellation
//! - [`StatusStage`] - raises a normalized error for status >= 400
//! - [`ExtractStage`] - decodes the body per the declared result type

mod extract;
mod fetch;
mod status;

pub use extract::ExtractStage;
pub use fetch::FetchStage;
pub use status::StatusStage;

use crate::descriptor::{FetchFn, RequestOptions};
use crate::error::{FetchError, RequestSnapshot};
use crate::response::{Payload, RawResponse, ResultType};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-dispatch context shared by every stage.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    /// Identity of the request being dispatched (id, url, method, body)
    pub snapshot: RequestSnapshot,
    /// Declared shape of the decoded result
    pub result_type: ResultType,
    /// Optional dispatch deadline
    pub timeout: Option<Duration>,
    /// Cancellation signal armed by the owning handle's abort/reset
    pub cancel: CancellationToken,
}

/// A pluggable dispatch stage.
///
/// All three capabilities are optional; the defaults mean "not provided,
/// try the next stage". `perform_fetch` and `decode_response` signal
/// absence by returning `None`.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Transform the outgoing options. The chain folds left across all
    /// stages, so each stage sees the previous stage's output.
    async fn mutate_options(
        &self,
        ctx: &DispatchContext,
        options: RequestOptions,
    ) -> Result<RequestOptions, FetchError> {
        let _ = ctx;
        Ok(options)
    }

    /// Perform the network call. The first stage returning `Some` wins;
    /// later fetch-capable stages are not invoked.
    async fn perform_fetch(
        &self,
        ctx: &DispatchContext,
        options: &RequestOptions,
    ) -> Option<Result<RawResponse, FetchError>> {
        let _ = (ctx, options);
        None
    }

    /// Decode the raw response. The first stage returning `Some` wins.
    async fn decode_response(
        &self,
        ctx: &DispatchContext,
        response: &RawResponse,
    ) -> Option<Result<Payload, FetchError>> {
        let _ = (ctx, response);
        None
    }
}

/// Ordered chain of dispatch stages.
///
/// Stages run in registration order, each awaited before the next; no
/// stage runs concurrently with another for the same dispatch.
#[derive(Clone, Default)]
pub struct StageChain {
    stages: Vec<Arc<dyn Stage>>,
}

impl StageChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chain: fetch, status detection, payload extraction.
    #[must_use]
    pub fn standard(fetch_fn: Arc<FetchFn>) -> Self {
        Self::new()
            .with(FetchStage::new(fetch_fn))
            .with(StatusStage)
            .with(ExtractStage)
    }

    /// Append a stage to the end of the chain.
    #[must_use]
    pub fn with(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Fold the options through every mutate-capable stage, in order,
    /// seeding with `options`.
    pub async fn run_mutate(
        &self,
        ctx: &DispatchContext,
        options: RequestOptions,
    ) -> Result<RequestOptions, FetchError> {
        let mut current = options;
        for stage in &self.stages {
            current = stage.mutate_options(ctx, current).await?;
        }
        Ok(current)
    }

    /// Query the chain for a fetch result; first `Some` wins.
    ///
    /// # Errors
    ///
    /// [`FetchError::Configuration`] when no stage produces a response.
    pub async fn run_fetch(
        &self,
        ctx: &DispatchContext,
        options: &RequestOptions,
    ) -> Result<RawResponse, FetchError> {
        for stage in &self.stages {
            if let Some(result) = stage.perform_fetch(ctx, options).await {
                return result;
            }
        }
        tracing::error!(
            target: "fetchplan::stages",
            url = %ctx.snapshot.url,
            "no fetch-capable stage registered"
        );
        Err(FetchError::Configuration(
            "no fetch-capable stage registered".to_owned(),
        ))
    }

    /// Query the chain for a decoded payload; first `Some` wins.
    ///
    /// When no stage decodes, the raw body bytes are paired unprocessed
    /// so custom chains without an extraction stage still settle.
    pub async fn run_decode(
        &self,
        ctx: &DispatchContext,
        response: &RawResponse,
    ) -> Result<Payload, FetchError> {
        for stage in &self.stages {
            if let Some(result) = stage.decode_response(ctx, response).await {
                return result;
            }
        }
        Ok(Payload::Bytes(response.bytes()))
    }
}

impl std::fmt::Debug for StageChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageChain")
            .field("len", &self.stages.len())
            .finish()
    }
}
