//! Header collection merging.
//!
//! Merging is right-biased and per-entry: later collections overwrite
//! earlier ones key by key, and keys not present before are added. Both
//! the rich [`http::HeaderMap`] representation and plain string pairs are
//! supported; output is always a `HeaderMap`.

use crate::error::FetchError;
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Merge header collections left-to-right; later values win per key.
///
/// ```ignore
/// let merged = headers::merge([&defaults, &overrides]);
/// ```
#[must_use]
pub fn merge<'a, I>(collections: I) -> HeaderMap
where
    I: IntoIterator<Item = &'a HeaderMap>,
{
    let mut out = HeaderMap::new();
    for map in collections {
        for (name, value) in map {
            // insert (not append): replaces any earlier value for the key
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

/// Build a `HeaderMap` from plain string pairs.
///
/// Duplicate keys follow the per-entry rule: the last pair wins.
///
/// # Errors
///
/// Returns [`FetchError::Configuration`] for an invalid header name or
/// value.
pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<HeaderMap, FetchError> {
    let mut out = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::try_from(*name)
            .map_err(|e| FetchError::Configuration(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::try_from(*value).map_err(|e| {
            FetchError::Configuration(format!("invalid header value for '{name}': {e}"))
        })?;
        out.insert(name, value);
    }
    Ok(out)
}
