//! Raw response and decoded payload types.
//!
//! The injected fetch primitive yields a [`RawResponse`] (status, headers,
//! body bytes). The stage chain decodes it into a [`Payload`] according to
//! the declared [`ResultType`]; a successful dispatch pairs both in a
//! [`ResponseData`].

use crate::error::FetchError;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

/// Declared shape of a decoded response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultType {
    /// UTF-8 text (lossy)
    Text,
    /// JSON document
    #[default]
    Json,
    /// Raw bytes
    Bytes,
    /// Opaque binary blob; decodes like `Bytes`
    Blob,
    /// `application/x-www-form-urlencoded` pairs
    Form,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(serde_json::Value),
    Bytes(Bytes),
    Form(Vec<(String, String)>),
}

impl Payload {
    /// Empty payload of the shape declared by `result_type`.
    ///
    /// Used for `204 No Content`: `{}` for JSON, `""` for text, empty
    /// bytes / empty pair list otherwise.
    #[must_use]
    pub fn empty(result_type: ResultType) -> Self {
        match result_type {
            ResultType::Text => Payload::Text(String::new()),
            ResultType::Json => Payload::Json(serde_json::Value::Object(serde_json::Map::new())),
            ResultType::Bytes | ResultType::Blob => Payload::Bytes(Bytes::new()),
            ResultType::Form => Payload::Form(Vec::new()),
        }
    }

    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Payload::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_form(self) -> Option<Vec<(String, String)>> {
        match self {
            Payload::Form(pairs) => Some(pairs),
            _ => None,
        }
    }
}

/// Raw response produced by the injected fetch primitive.
///
/// Owns the fully-read body; the body-reading helpers decode on demand
/// without consuming the response, so a decode stage can retry a
/// different interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body as UTF-8 text; invalid sequences become the replacement char.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body bytes (cheap clone, `Bytes` is reference-counted).
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.body.clone()
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    /// Returns [`FetchError::Decode`] if the body is not valid JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(|e| FetchError::Decode(Box::new(e)))
    }

    /// Parse the body as URL-encoded form pairs.
    ///
    /// # Errors
    /// Returns [`FetchError::Decode`] if the body is not a valid form.
    pub fn form(&self) -> Result<Vec<(String, String)>, FetchError> {
        serde_urlencoded::from_bytes(&self.body).map_err(|e| FetchError::Decode(Box::new(e)))
    }
}

/// Result of one successful dispatch: the raw response paired with its
/// decoded, post-processed payload. Produced once per dispatch and cached
/// by the owning handle.
#[derive(Debug, Clone)]
pub struct ResponseData {
    /// The raw response as returned by the fetch stage
    pub response: RawResponse,
    /// Decoded payload after post-processing
    pub payload: Payload,
}

impl ResponseData {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            Bytes::copy_from_slice(body.as_bytes()),
        )
    }

    #[test]
    fn test_empty_payload_shapes() {
        assert_eq!(
            Payload::empty(ResultType::Json),
            Payload::Json(serde_json::json!({}))
        );
        assert_eq!(
            Payload::empty(ResultType::Text),
            Payload::Text(String::new())
        );
        assert_eq!(
            Payload::empty(ResultType::Bytes),
            Payload::Bytes(Bytes::new())
        );
        assert_eq!(Payload::empty(ResultType::Blob), Payload::Bytes(Bytes::new()));
        assert_eq!(Payload::empty(ResultType::Form), Payload::Form(Vec::new()));
    }

    #[test]
    fn test_json_decoding() {
        let value: serde_json::Value = response(200, r#"{"ok":true}"#).json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_json_decode_failure() {
        let err = response(200, "not json").json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn test_form_decoding() {
        let pairs = response(200, "a=1&b=two").form().unwrap();
        assert_eq!(
            pairs,
            vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "two".to_owned())]
        );
    }

    #[test]
    fn test_text_is_lossy() {
        let raw = RawResponse::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from_static(&[0x68, 0x69, 0xFF]),
        );
        assert_eq!(raw.text(), "hi\u{FFFD}");
    }

    #[test]
    fn test_payload_accessors_reject_other_shapes() {
        assert!(Payload::Text("x".to_owned()).into_json().is_none());
        assert!(Payload::Json(serde_json::json!(1)).into_text().is_none());
        assert!(Payload::Bytes(Bytes::new()).into_form().is_none());
    }
}
