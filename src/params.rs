//! URL template expansion and query-string serialization.
//!
//! A path template may contain named placeholders (`:` followed by word
//! characters). Placeholders are substituted from the parameter mapping;
//! parameters not consumed by a placeholder are serialized through the
//! caller-injected stringify function and appended as a query string.

use crate::error::FetchError;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Parameter mapping for URL templates and cache-key derivation.
///
/// Ordered so that key projections (query strings, repository cache keys)
/// are deterministic.
pub type Params = BTreeMap<String, String>;

/// Query-string stringify function injected by the caller.
///
/// Receives only the parameters left over after placeholder substitution.
/// The returned string must not include the leading `?`.
pub type Stringify = dyn Fn(&Params) -> String + Send + Sync;

/// Default placeholder pattern: a colon followed by a word token, e.g.
/// `:id`
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(\w+)").unwrap_or_else(|e| panic!("placeholder regex: {e}")));

/// Ready-made stringify built on `serde_urlencoded`.
///
/// Pass as the `serialize_params` option when standard
/// `application/x-www-form-urlencoded` query strings are wanted:
///
/// ```ignore
/// let config = DescriptorConfig {
///     serialize_params: Some(Arc::new(params::form_urlencoded)),
///     ..Default::default()
/// };
/// ```
#[must_use]
pub fn form_urlencoded(params: &Params) -> String {
    serde_urlencoded::to_string(params).unwrap_or_default()
}

/// Expand `template`, substituting `:name` placeholders from `params`.
///
/// Parameters not consumed by a placeholder are serialized via
/// `stringify` and appended `?`-prefixed, only when the serialized form
/// is non-empty. A parameter that is present with an empty-string value
/// substitutes normally; only truly absent keys are an error.
///
/// # Errors
///
/// - [`FetchError::MissingParameter`] when a placeholder has no
///   corresponding key in `params`.
/// - [`FetchError::Configuration`] when leftover parameters exist but no
///   stringify function was supplied.
pub fn expand_template(
    template: &str,
    params: &Params,
    stringify: Option<&Stringify>,
) -> Result<String, FetchError> {
    expand_template_with(&PLACEHOLDER, template, params, stringify)
}

/// Like [`expand_template`], but with a caller-supplied placeholder
/// pattern. Capture group 1 must yield the parameter name.
///
/// # Errors
///
/// Same failure modes as [`expand_template`].
pub fn expand_template_with(
    pattern: &Regex,
    template: &str,
    params: &Params,
    stringify: Option<&Stringify>,
) -> Result<String, FetchError> {
    let mut consumed: BTreeSet<&str> = BTreeSet::new();
    let mut missing: Option<String> = None;

    let expanded = pattern.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = caps.get(1).map_or("", |m| m.as_str());
        match params.get(name) {
            Some(value) => {
                if let Some(key) = params.get_key_value(name).map(|(k, _)| k.as_str()) {
                    consumed.insert(key);
                }
                value.clone()
            }
            None => {
                if missing.is_none() {
                    missing = Some(name.to_owned());
                }
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(FetchError::MissingParameter { name });
    }

    let leftover: Params = params
        .iter()
        .filter(|(key, _)| !consumed.contains(key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if leftover.is_empty() {
        return Ok(expanded.into_owned());
    }

    let Some(stringify) = stringify else {
        return Err(FetchError::Configuration(
            "URL parameters present but no serialize_params function configured".to_owned(),
        ));
    };

    let query = stringify(&leftover);
    if query.is_empty() {
        Ok(expanded.into_owned())
    } else {
        Ok(format!("{expanded}?{query}"))
    }
}
