//! Immutable request descriptors.
//!
//! A [`RequestDescriptor`] is an immutable snapshot of request
//! configuration: base URL, path, parameter mapping, resolved full URL,
//! request options, and a composed post-process function. Descriptors are
//! derived from one another with [`RequestDescriptor::copy`], which merges
//! headers, shallow-merges params, and composes post-processing — never
//! mutating the source.

use crate::error::FetchError;
use crate::headers;
use crate::params::{self, Params, Stringify};
use crate::response::{Payload, RawResponse};
use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::Method;
use regex::Regex;
use std::sync::Arc;

/// Post-processing function applied to the decoded payload of each
/// successful dispatch. Defaults to identity; composed on `copy`.
pub type PostProcess = Arc<dyn Fn(Payload) -> Payload + Send + Sync>;

/// Pre-processing function applied to the outgoing options at the start
/// of each dispatch, before any stage runs. Defaults to identity;
/// composed on `copy`.
pub type PreProcess = Arc<dyn Fn(RequestOptions) -> RequestOptions + Send + Sync>;

/// Future returned by the injected fetch primitive.
pub type FetchFuture = BoxFuture<'static, Result<RawResponse, FetchError>>;

/// The injected fetch primitive: `(url, options) -> future of RawResponse`.
///
/// The transport itself (TLS, redirects, pooling) is entirely the
/// collaborator's concern; this crate only dispatches through it.
pub type FetchFn = dyn Fn(String, RequestOptions) -> FetchFuture + Send + Sync;

/// Request body, encoded into option bytes at descriptor construction.
#[derive(Debug, Clone)]
pub enum Body {
    /// Structured value, JSON-encoded; headers are left untouched
    Json(serde_json::Value),
    /// URL-encoded form pairs; injects the form content type unless an
    /// explicit content type is already present
    Form(Vec<(String, String)>),
    /// Plain text, passed through verbatim
    Text(String),
    /// Raw bytes, passed through verbatim
    Bytes(Bytes),
}

/// Outgoing request options handed to the fetch stage.
///
/// The pass-through fields (`cache`, `credentials`, `integrity`, `mode`,
/// `redirect`, `referrer`, `referrer_policy`) are carried verbatim for the
/// injected transport to interpret; this crate never inspects them.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub cache: Option<String>,
    pub credentials: Option<String>,
    pub integrity: Option<String>,
    pub mode: Option<String>,
    pub redirect: Option<String>,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            cache: None,
            credentials: None,
            integrity: None,
            mode: None,
            redirect: None,
            referrer: None,
            referrer_policy: None,
        }
    }
}

/// Recognized options for constructing a [`RequestDescriptor`].
#[derive(Clone, Default)]
pub struct DescriptorConfig {
    pub base_url: String,
    pub path: String,
    pub params: Option<Params>,
    /// Placeholder pattern override; capture group 1 is the parameter
    /// name. Defaults to `:(\w+)`.
    pub param_pattern: Option<Regex>,
    pub serialize_params: Option<Arc<Stringify>>,
    pub pre_process: Option<PreProcess>,
    pub post_process: Option<PostProcess>,
    pub body: Option<Body>,
    pub headers: HeaderMap,
    pub method: Option<Method>,
    pub cache: Option<String>,
    pub credentials: Option<String>,
    pub integrity: Option<String>,
    pub mode: Option<String>,
    pub redirect: Option<String>,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
    pub cacheable: bool,
    pub fetch_fn: Option<Arc<FetchFn>>,
}

/// Selective overrides for [`RequestDescriptor::copy`].
///
/// Every field follows "override wins, else inherit", except: headers
/// (merged right-biased), params (shallow-merged, patch keys win) and
/// `pre_process`/`post_process` (composed after the current function).
#[derive(Clone, Default)]
pub struct DescriptorPatch {
    pub base_url: Option<String>,
    pub path: Option<String>,
    pub params: Option<Params>,
    pub param_pattern: Option<Regex>,
    pub serialize_params: Option<Arc<Stringify>>,
    pub pre_process: Option<PreProcess>,
    pub post_process: Option<PostProcess>,
    pub body: Option<Body>,
    pub headers: HeaderMap,
    pub method: Option<Method>,
    pub cache: Option<String>,
    pub credentials: Option<String>,
    pub integrity: Option<String>,
    pub mode: Option<String>,
    pub redirect: Option<String>,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
    pub cacheable: Option<bool>,
    pub fetch_fn: Option<Arc<FetchFn>>,
}

/// Immutable request descriptor.
///
/// Created by [`RequestDescriptor::new`] or derived via
/// [`RequestDescriptor::copy`]. The full URL is resolved once at
/// construction time: template expansion when params are present, plain
/// concatenation otherwise.
#[derive(Clone)]
pub struct RequestDescriptor {
    base_url: String,
    path: String,
    params: Option<Params>,
    param_pattern: Option<Regex>,
    full_url: String,
    options: RequestOptions,
    pre_process: PreProcess,
    post_process: PostProcess,
    cacheable: bool,
    serialize_params: Option<Arc<Stringify>>,
    fetch_fn: Option<Arc<FetchFn>>,
}

impl RequestDescriptor {
    /// Build a descriptor from a configuration.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Configuration`] when `params` are non-empty but no
    ///   `serialize_params` function is supplied, or when the body fails
    ///   to encode.
    /// - [`FetchError::MissingParameter`] when the path template names a
    ///   placeholder absent from `params`.
    pub fn new(config: DescriptorConfig) -> Result<Self, FetchError> {
        if config.params.as_ref().is_some_and(|p| !p.is_empty())
            && config.serialize_params.is_none()
        {
            return Err(FetchError::Configuration(
                "params configured without a serialize_params function".to_owned(),
            ));
        }

        let full_url = resolve_url(
            &config.base_url,
            &config.path,
            config.params.as_ref(),
            config.param_pattern.as_ref(),
            config.serialize_params.as_deref(),
        )?;

        let mut headers = config.headers;
        let body = match &config.body {
            Some(body) => Some(encode_body(body, &mut headers)?),
            None => None,
        };

        Ok(Self {
            base_url: config.base_url,
            path: config.path,
            params: config.params,
            param_pattern: config.param_pattern,
            full_url,
            options: RequestOptions {
                method: config.method.unwrap_or(Method::GET),
                headers,
                body,
                cache: config.cache,
                credentials: config.credentials,
                integrity: config.integrity,
                mode: config.mode,
                redirect: config.redirect,
                referrer: config.referrer,
                referrer_policy: config.referrer_policy,
            },
            pre_process: config.pre_process.unwrap_or_else(|| Arc::new(|o| o)),
            post_process: config.post_process.unwrap_or_else(|| Arc::new(|p| p)),
            cacheable: config.cacheable,
            serialize_params: config.serialize_params,
            fetch_fn: config.fetch_fn,
        })
    }

    /// Derive a new descriptor with selective overrides.
    ///
    /// Never mutates `self`. Headers merge right-biased (patch wins per
    /// key), params shallow-merge (patch keys win), `pre_process` and
    /// `post_process` compose so that the patch function runs on the
    /// output of the current one, and every remaining field is
    /// patch-wins-else-inherit.
    /// The full URL is re-resolved against the merged state.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`RequestDescriptor::new`], evaluated against
    /// the merged configuration.
    pub fn copy(&self, patch: DescriptorPatch) -> Result<Self, FetchError> {
        let params = match (self.params.clone(), patch.params) {
            (Some(mut current), Some(over)) => {
                current.extend(over);
                Some(current)
            }
            (None, over) => over,
            (current, None) => current,
        };
        let serialize_params = patch
            .serialize_params
            .or_else(|| self.serialize_params.clone());

        if params.as_ref().is_some_and(|p| !p.is_empty()) && serialize_params.is_none() {
            return Err(FetchError::Configuration(
                "params configured without a serialize_params function".to_owned(),
            ));
        }

        let base_url = patch.base_url.unwrap_or_else(|| self.base_url.clone());
        let path = patch.path.unwrap_or_else(|| self.path.clone());
        let param_pattern = patch.param_pattern.or_else(|| self.param_pattern.clone());
        let full_url = resolve_url(
            &base_url,
            &path,
            params.as_ref(),
            param_pattern.as_ref(),
            serialize_params.as_deref(),
        )?;

        let mut headers = headers::merge([&self.options.headers, &patch.headers]);
        let body = match &patch.body {
            Some(body) => Some(encode_body(body, &mut headers)?),
            None => self.options.body.clone(),
        };

        let pre_process = match patch.pre_process {
            Some(next) => {
                let current = Arc::clone(&self.pre_process);
                Arc::new(move |options| next(current(options))) as PreProcess
            }
            None => Arc::clone(&self.pre_process),
        };

        let post_process = match patch.post_process {
            Some(next) => {
                let current = Arc::clone(&self.post_process);
                Arc::new(move |payload| next(current(payload))) as PostProcess
            }
            None => Arc::clone(&self.post_process),
        };

        Ok(Self {
            base_url,
            path,
            params,
            param_pattern,
            full_url,
            options: RequestOptions {
                method: patch.method.unwrap_or_else(|| self.options.method.clone()),
                headers,
                body,
                cache: patch.cache.or_else(|| self.options.cache.clone()),
                credentials: patch
                    .credentials
                    .or_else(|| self.options.credentials.clone()),
                integrity: patch.integrity.or_else(|| self.options.integrity.clone()),
                mode: patch.mode.or_else(|| self.options.mode.clone()),
                redirect: patch.redirect.or_else(|| self.options.redirect.clone()),
                referrer: patch.referrer.or_else(|| self.options.referrer.clone()),
                referrer_policy: patch
                    .referrer_policy
                    .or_else(|| self.options.referrer_policy.clone()),
            },
            pre_process,
            post_process,
            cacheable: patch.cacheable.unwrap_or(self.cacheable),
            serialize_params,
            fetch_fn: patch.fetch_fn.or_else(|| self.fetch_fn.clone()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Resolved full URL, derived once at construction.
    #[must_use]
    pub fn full_url(&self) -> &str {
        &self.full_url
    }

    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.options.method
    }

    #[must_use]
    pub fn cacheable(&self) -> bool {
        self.cacheable
    }

    #[must_use]
    pub fn fetch_fn(&self) -> Option<&Arc<FetchFn>> {
        self.fetch_fn.as_ref()
    }

    /// Apply the composed pre-process function to the outgoing options.
    #[must_use]
    pub fn pre_process(&self, options: RequestOptions) -> RequestOptions {
        (self.pre_process)(options)
    }

    /// Apply the composed post-process function to a decoded payload.
    #[must_use]
    pub fn post_process(&self, payload: Payload) -> Payload {
        (self.post_process)(payload)
    }
}

impl std::fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.options.method)
            .field("full_url", &self.full_url)
            .field("cacheable", &self.cacheable)
            .finish_non_exhaustive()
    }
}

/// Resolve the full URL: template expansion when params are present,
/// plain concatenation otherwise.
fn resolve_url(
    base_url: &str,
    path: &str,
    request_params: Option<&Params>,
    pattern: Option<&Regex>,
    stringify: Option<&Stringify>,
) -> Result<String, FetchError> {
    match request_params {
        Some(request_params) => {
            let expanded = match pattern {
                Some(pattern) => {
                    params::expand_template_with(pattern, path, request_params, stringify)?
                }
                None => params::expand_template(path, request_params, stringify)?,
            };
            Ok(format!("{base_url}{expanded}"))
        }
        None => Ok(format!("{base_url}{path}")),
    }
}

/// Encode a body into option bytes, injecting the form content type when
/// needed (never overriding an explicit one).
fn encode_body(body: &Body, headers: &mut HeaderMap) -> Result<Bytes, FetchError> {
    match body {
        Body::Json(value) => serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|e| FetchError::Configuration(format!("failed to encode JSON body: {e}"))),
        Body::Form(pairs) => {
            let encoded = serde_urlencoded::to_string(pairs)
                .map_err(|e| FetchError::Configuration(format!("failed to encode form body: {e}")))?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded;charset=utf-8"),
                );
            }
            Ok(Bytes::from(encoded))
        }
        Body::Text(text) => Ok(Bytes::from(text.clone())),
        Body::Bytes(bytes) => Ok(bytes.clone()),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::params::form_urlencoded;
    use serde_json::json;

    fn params_of(pairs: &[(&str, &str)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn base_descriptor() -> RequestDescriptor {
        RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/user/:id".to_owned(),
            params: Some(params_of(&[("id", "1")])),
            serialize_params: Some(Arc::new(form_urlencoded)),
            headers: headers::from_pairs(&[("x-a", "1"), ("x-c", "1")]).unwrap(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_full_url_from_template() {
        let descriptor = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/user/:id/:id2".to_owned(),
            params: Some(params_of(&[("id", "1"), ("id2", "2")])),
            serialize_params: Some(Arc::new(form_urlencoded)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(descriptor.full_url(), "/api/user/1/2");
    }

    #[test]
    fn test_full_url_unconsumed_params_as_query() {
        let descriptor = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/user".to_owned(),
            params: Some(params_of(&[("id", "1"), ("id2", "2")])),
            serialize_params: Some(Arc::new(form_urlencoded)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(descriptor.full_url(), "/api/user?id=1&id2=2");
    }

    #[test]
    fn test_full_url_custom_param_pattern() {
        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/user/{id}".to_owned(),
            params: Some(params_of(&[("id", "1")])),
            param_pattern: Some(Regex::new(r"\{(\w+)\}").unwrap()),
            serialize_params: Some(Arc::new(form_urlencoded)),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(a.full_url(), "/api/user/1");

        // The pattern is inherited through copy
        let b = a
            .copy(DescriptorPatch {
                params: Some(params_of(&[("id", "2")])),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(b.full_url(), "/api/user/2");
    }

    #[test]
    fn test_full_url_plain_concatenation_without_params() {
        let descriptor = RequestDescriptor::new(DescriptorConfig {
            base_url: "https://api.example.com".to_owned(),
            path: "/health".to_owned(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(descriptor.full_url(), "https://api.example.com/health");
    }

    #[test]
    fn test_params_without_serializer_is_configuration_error() {
        let err = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/user".to_owned(),
            params: Some(params_of(&[("id", "1")])),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn test_copy_does_not_mutate_source() {
        let a = base_descriptor();
        let url_before = a.full_url().to_owned();
        let headers_before = a.options().headers.clone();

        let b = a
            .copy(DescriptorPatch {
                params: Some(params_of(&[("id", "9")])),
                headers: headers::from_pairs(&[("x-a", "2")]).unwrap(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(a.full_url(), url_before);
        assert_eq!(a.options().headers, headers_before);
        assert_eq!(b.full_url(), "/api/user/9");
        assert_eq!(b.options().headers.get("x-a").unwrap(), "2");
    }

    #[test]
    fn test_copy_merges_headers_right_biased() {
        let a = base_descriptor();
        let b = a
            .copy(DescriptorPatch {
                headers: headers::from_pairs(&[("x-a", "2"), ("x-b", "1")]).unwrap(),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(b.options().headers.get("x-a").unwrap(), "2");
        assert_eq!(b.options().headers.get("x-b").unwrap(), "1");
        assert_eq!(b.options().headers.get("x-c").unwrap(), "1");
    }

    #[test]
    fn test_copy_shallow_merges_params() {
        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/search".to_owned(),
            params: Some(params_of(&[("q", "rust"), ("page", "1")])),
            serialize_params: Some(Arc::new(form_urlencoded)),
            ..Default::default()
        })
        .unwrap();

        let b = a
            .copy(DescriptorPatch {
                params: Some(params_of(&[("page", "2")])),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(b.full_url(), "/api/search?page=2&q=rust");
    }

    #[test]
    fn test_post_process_composition_order() {
        let plus = |n: i64| {
            Arc::new(move |payload: Payload| match payload {
                Payload::Json(v) => Payload::Json(json!(v.as_i64().unwrap_or(0) + n)),
                other => other,
            }) as PostProcess
        };

        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/n".to_owned(),
            post_process: Some(plus(1)),
            ..Default::default()
        })
        .unwrap();
        let b = a
            .copy(DescriptorPatch {
                post_process: Some(plus(2)),
                ..Default::default()
            })
            .unwrap();

        // b applies the patch function to the output of a's function
        assert_eq!(b.post_process(Payload::Json(json!(1))), Payload::Json(json!(4)));
        // a itself is unchanged
        assert_eq!(a.post_process(Payload::Json(json!(1))), Payload::Json(json!(2)));
    }

    #[test]
    fn test_pre_process_composition_order() {
        let tag = |name: &'static str, value: &'static str| {
            Arc::new(move |mut options: RequestOptions| {
                options.headers.insert(
                    http::HeaderName::from_static(name),
                    HeaderValue::from_static(value),
                );
                options
            }) as PreProcess
        };

        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/x".to_owned(),
            pre_process: Some(tag("x-stage", "first")),
            ..Default::default()
        })
        .unwrap();
        let b = a
            .copy(DescriptorPatch {
                pre_process: Some(tag("x-stage", "second")),
                ..Default::default()
            })
            .unwrap();

        // The patch function runs on the output of the current one
        let options = b.pre_process(RequestOptions::default());
        assert_eq!(options.headers.get("x-stage").unwrap(), "second");

        let options = a.pre_process(RequestOptions::default());
        assert_eq!(options.headers.get("x-stage").unwrap(), "first");
    }

    #[test]
    fn test_copy_inherits_serializer_for_new_params() {
        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/list".to_owned(),
            serialize_params: Some(Arc::new(form_urlencoded)),
            ..Default::default()
        })
        .unwrap();

        let b = a
            .copy(DescriptorPatch {
                params: Some(params_of(&[("page", "3")])),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(b.full_url(), "/api/list?page=3");
    }

    #[test]
    fn test_copy_params_without_serializer_fails() {
        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/list".to_owned(),
            ..Default::default()
        })
        .unwrap();

        let err = a
            .copy(DescriptorPatch {
                params: Some(params_of(&[("page", "3")])),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, FetchError::Configuration(_)));
    }

    #[test]
    fn test_json_body_encodes_without_touching_headers() {
        let descriptor = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/users".to_owned(),
            method: Some(Method::POST),
            body: Some(Body::Json(json!({"name": "Alice"}))),
            ..Default::default()
        })
        .unwrap();

        let body = descriptor.options().body.as_ref().unwrap();
        let value: serde_json::Value = serde_json::from_slice(body).unwrap();
        assert_eq!(value["name"], "Alice");
        assert!(descriptor.options().headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_form_body_injects_content_type() {
        let descriptor = RequestDescriptor::new(DescriptorConfig {
            base_url: "/auth".to_owned(),
            path: "/token".to_owned(),
            method: Some(Method::POST),
            body: Some(Body::Form(vec![(
                "grant_type".to_owned(),
                "client_credentials".to_owned(),
            )])),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            descriptor.options().headers.get(CONTENT_TYPE).unwrap(),
            "application/x-www-form-urlencoded;charset=utf-8"
        );
        assert_eq!(
            descriptor.options().body.as_ref().unwrap(),
            &Bytes::from_static(b"grant_type=client_credentials")
        );
    }

    #[test]
    fn test_form_body_keeps_explicit_content_type() {
        let descriptor = RequestDescriptor::new(DescriptorConfig {
            base_url: "/auth".to_owned(),
            path: "/token".to_owned(),
            headers: headers::from_pairs(&[("content-type", "text/plain")]).unwrap(),
            body: Some(Body::Form(vec![("a".to_owned(), "1".to_owned())])),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(
            descriptor.options().headers.get(CONTENT_TYPE).unwrap(),
            "text/plain"
        );
    }

    #[test]
    fn test_copy_override_wins_else_inherit() {
        let a = RequestDescriptor::new(DescriptorConfig {
            base_url: "/api".to_owned(),
            path: "/x".to_owned(),
            credentials: Some("include".to_owned()),
            mode: Some("cors".to_owned()),
            cacheable: true,
            ..Default::default()
        })
        .unwrap();

        let b = a
            .copy(DescriptorPatch {
                mode: Some("no-cors".to_owned()),
                method: Some(Method::DELETE),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(b.options().credentials.as_deref(), Some("include"));
        assert_eq!(b.options().mode.as_deref(), Some("no-cors"));
        assert_eq!(b.method(), &Method::DELETE);
        assert!(b.cacheable());
    }
}
