//! Matching compiled patterns against paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compile::{compile, CompiledMatcher, PatternError, PatternParser, DEFAULT_PATTERN};
use crate::pattern::Pattern;

/// Parameters extracted from a path.
///
/// Keys are either declared names or positional indices (`"0"`, `"1"`, ...).
/// A declared optional parameter that did not participate in the match is
/// present with a `None` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Option<String>>);

impl Params {
    /// Create an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a parameter; `None` when absent or declared-but-unmatched.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_deref())
    }

    /// Value of a positional parameter.
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.get(&index.to_string())
    }

    /// Whether the key is present, even with no value.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or overwrite a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.0.insert(key.into(), value);
    }

    /// Remove a parameter.
    pub fn remove(&mut self, key: &str) -> Option<Option<String>> {
        self.0.remove(key)
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Iterate over keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Merge an outer scope's parameters with an inner scope's.
    ///
    /// Named keys from `inner` shadow those from `outer`. Positional keys are
    /// taken from `inner` only.
    #[must_use]
    pub fn merge_scoped(outer: &Params, inner: &Params) -> Params {
        let mut merged: BTreeMap<String, Option<String>> = outer
            .0
            .iter()
            .filter(|(key, _)| !is_positional_key(key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        merged.extend(inner.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Params(merged)
    }
}

/// Whether a key is a positional index.
#[must_use]
pub fn is_positional_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Params(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Outcome of matching a pattern against a path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    params: Option<Params>,
    base: String,
}

impl MatchResult {
    /// A failed match.
    #[must_use]
    pub fn no_match() -> Self {
        Self::default()
    }

    /// A successful match.
    #[must_use]
    pub fn matched(params: Params, base: impl Into<String>) -> Self {
        Self {
            params: Some(params),
            base: base.into(),
        }
    }

    /// Whether the pattern matched.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.params.is_some()
    }

    /// Extracted parameters; `None` exactly when there was no match.
    #[must_use]
    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    /// Take the extracted parameters.
    #[must_use]
    pub fn into_params(self) -> Option<Params> {
        self.params
    }

    /// Prefix of the path consumed by a loose match; empty for exact
    /// matches and failures.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }
}

/// Match a compiled pattern against a path.
///
/// The match must start at the beginning of the path.
#[must_use]
pub fn match_path(compiled: &CompiledMatcher, path: &str) -> MatchResult {
    let Some(caps) = compiled.regex().captures(path) else {
        return MatchResult::no_match();
    };
    let Some(whole) = caps.get(0) else {
        return MatchResult::no_match();
    };
    // Leftmost semantics: if a match at 0 exists, it is the one returned.
    if whole.start() != 0 {
        return MatchResult::no_match();
    }

    let mut params = Params::new();
    let value_of = |group: usize| caps.get(group).map(|m| m.as_str().to_string());

    match compiled.keys() {
        Some(keys) => {
            for (index, key) in keys.iter().enumerate() {
                let value = value_of(index + 1);
                params.insert(index.to_string(), value.clone());
                params.insert(key.clone(), value);
            }
        }
        None => {
            for (group, name) in compiled.regex().capture_names().enumerate().skip(1) {
                let value = value_of(group);
                params.insert((group - 1).to_string(), value.clone());
                if let Some(name) = name {
                    params.insert(name, value);
                }
            }
        }
    }

    let base = if compiled.is_loose() {
        let end = compiled
            .boundary()
            .and_then(|group| caps.get(group))
            .map_or(whole.end(), |m| m.start());
        &path[..end]
    } else {
        ""
    };

    MatchResult::matched(params, base)
}

/// Match an optional pattern against a path using `parser` for templates.
///
/// A missing pattern falls back to the `*` catch-all, so the whole path is
/// exposed as both `"0"` and `"*"`.
///
/// # Errors
///
/// Returns an error if the pattern fails to compile.
pub fn match_route(
    parser: &dyn PatternParser,
    pattern: Option<&Pattern>,
    path: &str,
    loose: bool,
) -> Result<MatchResult, PatternError> {
    let compiled: Arc<CompiledMatcher> = match pattern {
        None => parser.parse(DEFAULT_PATTERN, loose)?,
        Some(Pattern::Template(template)) => parser.parse(template, loose)?,
        Some(regex @ Pattern::Regex(_)) => compile(regex, loose)?,
    };
    Ok(match_path(&compiled, path))
}
