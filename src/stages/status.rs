//! Error detection for non-success statuses.

use super::{DispatchContext, Stage};
use crate::error::{FetchError, HttpError};
use crate::response::{Payload, RawResponse};
use async_trait::async_trait;

/// Decode-capable stage that raises a normalized [`HttpError`] for any
/// response with status >= 400.
///
/// The body is read as text and best-effort parsed as a structured
/// server-error payload: either `{"error": {"id", "code", "message"}}`
/// or the same fields at the top level. Server-supplied fields win;
/// missing ones are synthesized from the status line and request
/// snapshot. Success statuses return `None` so a later extraction stage
/// decodes the payload.
pub struct StatusStage;

#[async_trait]
impl Stage for StatusStage {
    async fn decode_response(
        &self,
        ctx: &DispatchContext,
        response: &RawResponse,
    ) -> Option<Result<Payload, FetchError>> {
        let status = response.status();
        if status.as_u16() < 400 {
            return None;
        }

        let body = response.text();
        let parsed = parse_error_body(&body);

        let message = parsed
            .as_ref()
            .and_then(|p| p.message.clone())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("HTTP error")
                    .to_owned()
            });

        let err = HttpError {
            id: parsed
                .as_ref()
                .and_then(|p| p.id.clone())
                .unwrap_or_else(|| ctx.snapshot.id.clone()),
            status: Some(status),
            code: parsed
                .as_ref()
                .and_then(|p| p.code.clone())
                .unwrap_or_else(|| "EHTTP".to_owned()),
            message,
            cause: if body.is_empty() { None } else { Some(body) },
            request: ctx.snapshot.clone(),
        };

        Some(Err(err.into()))
    }
}

/// Server-error fields extracted from a JSON error body.
struct ParsedError {
    id: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

fn parse_error_body(body: &str) -> Option<ParsedError> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    // Nested {"error": {...}} wins over top-level fields
    let source = value.get("error").filter(|v| v.is_object()).unwrap_or(&value);

    let field = |name: &str| {
        source
            .get(name)
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned)
    };

    Some(ParsedError {
        id: field("id"),
        code: field("code"),
        message: field("message"),
    })
}
