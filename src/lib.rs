#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Transport-agnostic HTTP request planning and caching
//!
//! This crate builds and dispatches HTTP requests over an injected fetch
//! primitive; it owns no transport of its own. It provides:
//! - Immutable request descriptors with non-destructive derivation
//!   (merged headers, shallow-merged params, composed post-processing)
//! - URL templating (`/user/:id`) with query serialization of leftover
//!   parameters
//! - A stage chain with three capabilities per stage: mutate outgoing
//!   options, perform the fetch, decode the response
//! - Stateful request handles that de-duplicate concurrent dispatches
//!   and support cancellation and timeouts
//! - Endpoints that mint and share handles by request identity
//! - Loaders and repositories for value-level caching with
//!   retry-on-failure semantics
//! - A single normalized error type ([`HttpError`]) for every failure
//!
//! # Example
//!
//! ```ignore
//! use fetchplan::{DescriptorConfig, DescriptorPatch, Endpoint, params};
//! use std::sync::Arc;
//!
//! let base = fetchplan::RequestDescriptor::new(DescriptorConfig {
//!     base_url: "https://api.example.com".into(),
//!     path: "/user/:id".into(),
//!     serialize_params: Some(Arc::new(params::form_urlencoded)),
//!     cacheable: true,
//!     fetch_fn: Some(my_fetch),
//!     ..Default::default()
//! })?;
//!
//! let users = Endpoint::with_fetch(base)?;
//! let alice = users.get(DescriptorPatch {
//!     params: Some([("id".into(), "1".into())].into()),
//!     ..Default::default()
//! })?;
//!
//! // Concurrent fetches of the same handle share one network call
//! let profile = alice.json().await?;
//! ```

mod descriptor;
mod endpoint;
mod error;
mod handle;
pub mod headers;
pub mod params;
mod repository;
mod response;
pub mod stages;

pub use descriptor::{
    Body, DescriptorConfig, DescriptorPatch, FetchFn, FetchFuture, PostProcess, PreProcess,
    RequestDescriptor, RequestOptions,
};
pub use endpoint::{Endpoint, KeyFn};
pub use error::{FetchError, HttpError, RequestSnapshot};
pub use handle::RequestHandle;
pub use params::Params;
pub use repository::{LoadFn, Loader, MakeLoader, Repository};
pub use response::{Payload, RawResponse, ResponseData, ResultType};
pub use stages::{DispatchContext, ExtractStage, FetchStage, Stage, StageChain, StatusStage};
