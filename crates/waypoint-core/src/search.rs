//! Structured access to the search string.

use std::fmt;
use url::form_urlencoded;

/// Ordered query parameters, parsed with `application/x-www-form-urlencoded`
/// rules. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    /// Empty parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a search string, with or without the leading `?`.
    #[must_use]
    pub fn parse(search: &str) -> Self {
        let search = search.strip_prefix('?').unwrap_or(search);
        Self {
            pairs: form_urlencoded::parse(search.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `key`, in order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Set `key` to a single value, keeping the position of its first
    /// occurrence.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter().position(|(k, _)| *k == key) {
            Some(first) => {
                self.pairs[first].1 = value;
                let mut index = 0;
                self.pairs.retain(|(k, _)| {
                    let keep = index <= first || *k != key;
                    index += 1;
                    keep
                });
            }
            None => self.pairs.push((key, value)),
        }
    }

    /// Add a value for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// Remove every value for `key`.
    pub fn delete(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| k != key);
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Distinct keys in order of first appearance.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.pairs {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }

    /// Iterate over pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs.iter())
            .finish();
        f.write_str(&encoded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SearchParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_get() {
        let params = SearchParams::parse("?tab=posts&tag=a&tag=b&empty=");
        assert_eq!(params.get("tab"), Some("posts"));
        assert_eq!(params.get_all("tag"), vec!["a", "b"]);
        assert_eq!(params.get("empty"), Some(""));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.len(), 4);
        assert_eq!(params.keys(), vec!["tab", "tag", "empty"]);
    }

    #[test]
    fn test_reserved_escapes_stay_in_value() {
        let params = SearchParams::parse("search=foo%26parameter_injection%3Dbar");
        assert_eq!(params.get("search"), Some("foo&parameter_injection=bar"));
        assert!(!params.has("parameter_injection"));
    }

    #[test]
    fn test_set_keeps_first_position() {
        let mut params = SearchParams::parse("a=1&b=2&a=3");
        params.set("a", "9");
        assert_eq!(params.to_string(), "a=9&b=2");

        params.set("c", "new");
        assert_eq!(params.to_string(), "a=9&b=2&c=new");
    }

    #[test]
    fn test_append_and_delete() {
        let mut params = SearchParams::new();
        params.append("x", "1");
        params.append("x", "2");
        assert_eq!(params.to_string(), "x=1&x=2");

        params.delete("x");
        assert!(params.is_empty());
    }

    #[test]
    fn test_serialization_encodes() {
        let params: SearchParams = [("q", "rust & wasm")].into_iter().collect();
        assert_eq!(params.to_string(), "q=rust+%26+wasm");
        assert_eq!(SearchParams::parse(&params.to_string()), params);
    }
}
