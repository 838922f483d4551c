use http::StatusCode;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Snapshot of the request that produced a failure.
///
/// Captured once when a dispatch starts and attached verbatim to any
/// [`HttpError`] raised for that dispatch. Serializable for diagnostics
/// and structured logging, not for wire transmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestSnapshot {
    /// Per-dispatch request id (UUID v4)
    pub id: String,
    /// Fully resolved URL
    pub url: String,
    /// HTTP method, display form
    pub method: String,
    /// Stringified request body, if any
    pub body: Option<String>,
}

/// Normalized failure value for a dispatched request.
///
/// Every heterogeneous failure (network failure, non-2xx status, decode
/// failure, thrown stage error) is converted into this single type before
/// it reaches the caller. Constructed once at the point the failure is
/// detected and never mutated afterwards; an `HttpError` raised deep in
/// the stage chain passes through [`HttpError::normalize`] unwrapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// Error identifier: server-supplied when the error body carried one,
    /// otherwise the request id
    pub id: String,
    /// HTTP status, when one was observed
    pub status: Option<StatusCode>,
    /// Machine error code (server-supplied or synthesized, e.g. `ETIMEDOUT`)
    pub code: String,
    /// User-facing message
    pub message: String,
    /// Message of the originating failure, if this error wraps one
    pub cause: Option<String>,
    /// Snapshot of the originating request
    pub request: RequestSnapshot,
}

impl HttpError {
    /// Normalize any [`FetchError`] into an `HttpError` carrying `request`.
    ///
    /// Wrap-once contract: an error that is already `FetchError::Http`
    /// is returned as-is, never re-wrapped. Timeouts are conventionally
    /// mapped to status 408 with code `ETIMEDOUT`.
    #[must_use]
    pub fn normalize(err: FetchError, request: RequestSnapshot) -> Self {
        match err {
            FetchError::Http(e) => *e,
            FetchError::Timeout(duration) => Self {
                id: request.id.clone(),
                status: Some(StatusCode::REQUEST_TIMEOUT),
                code: "ETIMEDOUT".to_owned(),
                message: format!("request timed out after {duration:?}"),
                cause: None,
                request,
            },
            other => {
                let code = match &other {
                    FetchError::Configuration(_) => "ECONFIG",
                    FetchError::MissingParameter { .. } => "EPARAM",
                    FetchError::Transport(_) => "ECONN",
                    FetchError::Decode(_) => "EDECODE",
                    // Handled by the arms above
                    FetchError::Timeout(_) | FetchError::Http(_) => unreachable!(),
                };
                let cause = std::error::Error::source(&other).map(ToString::to_string);
                Self {
                    id: request.id.clone(),
                    status: None,
                    code: code.to_owned(),
                    message: other.to_string(),
                    cause,
                    request,
                }
            }
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "{} ({status}): {} [{} {}]",
                self.code, self.message, self.request.method, self.request.url
            ),
            None => write!(
                f,
                "{}: {} [{} {}]",
                self.code, self.message, self.request.method, self.request.url
            ),
        }
    }
}

impl std::error::Error for HttpError {}

/// Errors raised while composing descriptors or running the stage chain.
///
/// At the dispatch boundary every variant except `Http` is wrapped once
/// into an [`HttpError`] via [`HttpError::normalize`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FetchError {
    /// Invalid builder or chain configuration (params without a
    /// serializer, no fetch-capable stage registered)
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A URL template placeholder has no corresponding parameter
    #[error("missing URL template parameter ':{name}'")]
    MissingParameter { name: String },

    /// Dispatch exceeded the configured duration
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Injected fetch primitive failed (network, connection, abort)
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Response body could not be decoded into the declared result type
    #[error("response decoding failed: {0}")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Already-normalized failure; passes through unwrapped
    #[error(transparent)]
    Http(Box<HttpError>),
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        FetchError::Http(Box::new(err))
    }
}
