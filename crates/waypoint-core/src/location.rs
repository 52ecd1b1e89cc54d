//! Location snapshots and path helpers.
//!
//! A [`Location`] is immutable; every navigation produces a new one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Escape marker that makes a navigation target absolute, ignoring the base.
pub const ABSOLUTE_PREFIX: char = '~';

/// Bytes that `decode_uri` leaves percent-encoded.
const URI_RESERVED: &[u8] = b";/?:@&=+$,#";

/// A committed location: path plus search string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    path: String,
    search: String,
}

impl Location {
    /// Create a location. The path gains a leading `/` if missing and the
    /// search string is sanitised (see [`sanitize_search`]).
    #[must_use]
    pub fn new(path: impl Into<String>, search: &str) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self {
            path,
            search: sanitize_search(search),
        }
    }

    /// Parse an href such as `/users?page=2#top`. The fragment is dropped.
    #[must_use]
    pub fn parse(href: &str) -> Self {
        let href = href.split_once('#').map_or(href, |(before, _)| before);
        match href.split_once('?') {
            Some((path, search)) => Self::new(path, search),
            None => Self::new(href, ""),
        }
    }

    /// The root location `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::new("/", "")
    }

    /// Path, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Search string without the leading `?`; empty when absent.
    #[must_use]
    pub fn search(&self) -> &str {
        &self.search
    }

    /// Path and search joined back into an href.
    #[must_use]
    pub fn href(&self) -> String {
        if self.search.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.search)
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.href())
    }
}

/// Normalise a raw search string: one leading `?` is stripped, escapes are
/// decoded with [`decode_uri`], and whitespace-only input becomes empty.
#[must_use]
pub fn sanitize_search(raw: &str) -> String {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let decoded = decode_uri(raw);
    if decoded.trim().is_empty() {
        String::new()
    } else {
        decoded
    }
}

/// Decode percent escapes the way `decodeURI` does: escapes of reserved
/// characters (`&`, `=`, `/`, ...) stay encoded so decoded text cannot
/// introduce new separators. Malformed input is returned unchanged.
#[must_use]
pub fn decode_uri(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let Some(byte) = bytes.get(i + 1..i + 3).and_then(hex_byte) else {
            return input.to_string();
        };
        if URI_RESERVED.contains(&byte) {
            match urlencoding::decode(&input[start..i]) {
                Ok(piece) => out.push_str(&piece),
                Err(_) => return input.to_string(),
            }
            out.push_str(&input[i..i + 3]);
            start = i + 3;
        }
        i += 3;
    }

    match urlencoding::decode(&input[start..]) {
        Ok(rest) => out.push_str(&rest),
        Err(_) => return input.to_string(),
    }
    out
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    if !pair.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

/// Path as seen from inside `base`.
///
/// The base is stripped case-insensitively; a path outside the base is
/// returned with the `~` prefix so no relative pattern can match it.
#[must_use]
pub fn relative_path(base: &str, path: &str) -> String {
    let inside = path
        .get(..base.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(base));

    if inside {
        match &path[base.len()..] {
            "" => "/".to_string(),
            rest => rest.to_string(),
        }
    } else {
        format!("{ABSOLUTE_PREFIX}{path}")
    }
}

/// Resolve a navigation target against `base`. Targets starting with `~`
/// are absolute.
#[must_use]
pub fn absolute_path(to: &str, base: &str) -> String {
    match to.strip_prefix(ABSOLUTE_PREFIX) {
        Some(absolute) => absolute.to_string(),
        None => format!("{base}{to}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_new_normalizes() {
        let location = Location::new("users", "?page=2");
        assert_eq!(location.path(), "/users");
        assert_eq!(location.search(), "page=2");
        assert_eq!(location.href(), "/users?page=2");
    }

    #[test]
    fn test_location_parse() {
        let location = Location::parse("/catalog?sort=created_at#top");
        assert_eq!(location.path(), "/catalog");
        assert_eq!(location.search(), "sort=created_at");

        let location = Location::parse("/no-search");
        assert_eq!(location.search(), "");
        assert_eq!(location.to_string(), "/no-search");
    }

    #[test]
    fn test_search_whitespace_is_empty() {
        assert_eq!(sanitize_search("?"), "");
        assert_eq!(sanitize_search("? "), "");
        assert_eq!(sanitize_search("?%20"), "");
        assert_eq!(sanitize_search(""), "");
    }

    #[test]
    fn test_decode_uri_keeps_reserved_escapes() {
        assert_eq!(
            decode_uri("search=foo%26parameter_injection%3Dbar"),
            "search=foo%26parameter_injection%3Dbar"
        );
        assert_eq!(decode_uri("nonce=not%20Found"), "nonce=not Found");
        assert_eq!(
            decode_uri("country=%E1%83%A1%E1%83%90"),
            "country=სა"
        );
    }

    #[test]
    fn test_decode_uri_is_fail_safe() {
        assert_eq!(decode_uri("/%not-valid"), "/%not-valid");
        assert_eq!(decode_uri("/99%"), "/99%");
        assert_eq!(decode_uri("%E1%83"), "%E1%83");
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("", "/users"), "/users");
        assert_eq!(relative_path("/app", "/app/nested"), "/nested");
        assert_eq!(relative_path("/app", "/APP/nested"), "/nested");
        assert_eq!(relative_path("/app", "/app"), "/");
        assert_eq!(relative_path("/app", "/other"), "~/other");
    }

    #[test]
    fn test_absolute_path() {
        assert_eq!(absolute_path("/nested", "/app"), "/app/nested");
        assert_eq!(absolute_path("~/absolute", "/app"), "/absolute");
    }
}
