//! Route pattern values.
//!
//! A pattern is either a path template (`/users/:id`) or a precompiled
//! regular expression whose capture groups become parameters.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::compile::PatternError;

/// A dynamic value was supplied where a route pattern was required.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected a route pattern (string or {{ \"regex\": .. }} object), found {found}")]
pub struct MatchTypeError {
    /// Kind of value that was found instead.
    pub found: &'static str,
}

/// A route pattern.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Path template such as `/users/:id` or `/docs/*`.
    Template(String),
    /// Precompiled rule; named groups become parameter names.
    Regex(Regex),
}

impl Pattern {
    /// Create a template pattern.
    #[must_use]
    pub fn template(template: impl Into<String>) -> Self {
        Self::Template(template.into())
    }

    /// Compile a regular expression pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression is not a valid regex.
    pub fn regex(source: &str) -> Result<Self, PatternError> {
        Ok(Self::Regex(Regex::new(source)?))
    }

    /// Source text of the pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Template(template) => template,
            Self::Regex(regex) => regex.as_str(),
        }
    }

    /// Whether this is a precompiled regex pattern.
    #[must_use]
    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex(_))
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.is_regex() == other.is_regex() && self.as_str() == other.as_str()
    }
}

impl Eq for Pattern {}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(template) => write!(f, "{template}"),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self::Template(s.to_string())
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self::Template(s)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

/// Serializable description of a pattern, as found in route tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternSpec {
    /// A path template.
    Template(String),
    /// A regular expression source.
    Regex {
        /// Regex source text.
        regex: String,
    },
}

impl PatternSpec {
    /// Turn the description into a usable pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if a regex source does not compile.
    pub fn into_pattern(self) -> Result<Pattern, PatternError> {
        match self {
            Self::Template(template) => Ok(Pattern::Template(template)),
            Self::Regex { regex } => Pattern::regex(&regex),
        }
    }
}

impl TryFrom<Value> for PatternSpec {
    type Error = MatchTypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(template) => Ok(Self::Template(template)),
            Value::Object(mut map) => match map.remove("regex") {
                Some(Value::String(regex)) => Ok(Self::Regex { regex }),
                _ => Err(MatchTypeError {
                    found: "object without a `regex` string",
                }),
            },
            Value::Null => Err(MatchTypeError { found: "null" }),
            Value::Bool(_) => Err(MatchTypeError { found: "boolean" }),
            Value::Number(_) => Err(MatchTypeError { found: "number" }),
            Value::Array(_) => Err(MatchTypeError { found: "array" }),
        }
    }
}
