//! Network dispatch through the injected fetch primitive.

use super::{DispatchContext, Stage};
use crate::descriptor::{FetchFn, RequestOptions};
use crate::error::FetchError;
use crate::response::RawResponse;
use async_trait::async_trait;
use std::sync::Arc;

/// Fetch-capable stage wrapping the injected transport.
///
/// Races the transport call against the configured timeout and the
/// handle's cancellation token. On timeout the pending call's eventual
/// result is ignored; cancellation is best-effort, the transport is
/// simply no longer awaited.
pub struct FetchStage {
    fetch_fn: Arc<FetchFn>,
}

impl FetchStage {
    #[must_use]
    pub fn new(fetch_fn: Arc<FetchFn>) -> Self {
        Self { fetch_fn }
    }
}

#[async_trait]
impl Stage for FetchStage {
    async fn perform_fetch(
        &self,
        ctx: &DispatchContext,
        options: &RequestOptions,
    ) -> Option<Result<RawResponse, FetchError>> {
        let call = (self.fetch_fn)(ctx.snapshot.url.clone(), options.clone());

        let result = match ctx.timeout {
            Some(duration) => {
                tokio::select! {
                    () = ctx.cancel.cancelled() => Err(aborted()),
                    timed = tokio::time::timeout(duration, call) => match timed {
                        Ok(result) => result,
                        Err(_) => Err(FetchError::Timeout(duration)),
                    },
                }
            }
            None => {
                tokio::select! {
                    () = ctx.cancel.cancelled() => Err(aborted()),
                    result = call => result,
                }
            }
        };

        Some(result)
    }
}

fn aborted() -> FetchError {
    FetchError::Transport("request aborted".into())
}
