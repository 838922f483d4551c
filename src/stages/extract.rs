//! Typed payload extraction.

use super::{DispatchContext, Stage};
use crate::error::FetchError;
use crate::response::{Payload, RawResponse, ResultType};
use async_trait::async_trait;
use http::StatusCode;

/// Decode-capable stage that extracts the body according to the declared
/// [`ResultType`].
///
/// `204 No Content` short-circuits to the empty shape of the declared
/// type without attempting to parse a body.
pub struct ExtractStage;

#[async_trait]
impl Stage for ExtractStage {
    async fn decode_response(
        &self,
        ctx: &DispatchContext,
        response: &RawResponse,
    ) -> Option<Result<Payload, FetchError>> {
        if response.status() == StatusCode::NO_CONTENT {
            return Some(Ok(Payload::empty(ctx.result_type)));
        }

        let payload = match ctx.result_type {
            ResultType::Text => Ok(Payload::Text(response.text())),
            ResultType::Json => response.json().map(Payload::Json),
            ResultType::Bytes | ResultType::Blob => Ok(Payload::Bytes(response.bytes())),
            ResultType::Form => response.form().map(Payload::Form),
        };

        Some(payload)
    }
}
