//! Pattern compiler.
//!
//! Turns path templates into anchored, case-insensitive regexes plus an
//! ordered list of parameter names. Compiled matchers are cached for the
//! lifetime of the process, keyed by the raw pattern and the looseness flag.
//!
//! ## Template grammar
//!
//! | Segment      | Meaning                                          |
//! |--------------|--------------------------------------------------|
//! | `users`      | literal, matched verbatim (case-insensitive)     |
//! | `:id`        | exactly one segment                              |
//! | `:id?`       | zero or one segment                              |
//! | `:file.json` | one segment ending with a literal suffix         |
//! | `*`, `:rest*`| remainder of the path, possibly empty            |
//! | `*?`, `:rest*?` | optional remainder, separator included        |
//! | `:rest+`     | non-empty remainder                              |

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::pattern::Pattern;

/// Parameter name given to a bare `*` wildcard.
pub const WILDCARD_KEY: &str = "*";

/// Pattern used for routes that do not declare one.
pub const DEFAULT_PATTERN: &str = "*";

/// Characters that may not appear in literal segments.
const RESERVED: [char; 3] = [':', '*', '?'];

/// Errors raised while compiling a pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A `:` marker without a name.
    #[error("Empty parameter name in segment `{0}`")]
    EmptyParamName(String),

    /// Parameter name contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid parameter name `{name}` in segment `{segment}`")]
    InvalidParamName {
        /// The offending name.
        name: String,
        /// The full segment.
        segment: String,
    },

    /// Optional/wildcard markers that do not form a known modifier.
    #[error("Unbalanced optional or wildcard marker in segment `{0}`")]
    UnbalancedMarker(String),

    /// A reserved character inside a literal segment.
    #[error("Reserved character `{ch}` in literal segment `{segment}`")]
    ReservedCharacter {
        /// The reserved character.
        ch: char,
        /// The full segment.
        segment: String,
    },

    /// The generated or supplied regex failed to compile.
    #[error("Invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

/// One parsed segment of a path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Static(String),
    /// `:name`
    Required(String),
    /// `:name?`
    Optional(String),
    /// `:name.ext` or `:name?.ext`
    Suffixed {
        /// Parameter name.
        name: String,
        /// Literal suffix, including the leading dot.
        suffix: String,
        /// Whether the whole segment may be absent.
        optional: bool,
    },
    /// `*`, `*?`, `:name*`, `:name*?`
    Wildcard {
        /// Parameter name (`*` for anonymous wildcards).
        name: String,
        /// Whether the separator may be absent too.
        optional: bool,
    },
    /// `:name+`
    RequiredWildcard(String),
}

impl Segment {
    /// Name of the parameter captured by this segment, if any.
    #[must_use]
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Self::Static(_) => None,
            Self::Required(name)
            | Self::Optional(name)
            | Self::RequiredWildcard(name)
            | Self::Suffixed { name, .. }
            | Self::Wildcard { name, .. } => Some(name),
        }
    }

    fn write_regex(&self, out: &mut String) {
        match self {
            Self::Static(text) => {
                out.push('/');
                out.push_str(&regex::escape(text));
            }
            Self::Required(_) => out.push_str("/([^/]+)"),
            Self::Optional(_) => out.push_str("(?:/([^/]+))?"),
            Self::Suffixed {
                suffix, optional, ..
            } => {
                let body = format!("/([^/]+?){}", regex::escape(suffix));
                if *optional {
                    out.push_str(&format!("(?:{body})?"));
                } else {
                    out.push_str(&body);
                }
            }
            Self::Wildcard { optional: false, .. } => out.push_str("/(.*)"),
            Self::Wildcard { optional: true, .. } => out.push_str("(?:/(.*))?"),
            Self::RequiredWildcard(_) => out.push_str("/(.+)"),
        }
    }
}

/// Classify a single template segment.
///
/// # Errors
///
/// Returns an error for malformed markers, bad parameter names and reserved
/// characters in literal text.
pub fn classify_segment(segment: &str) -> Result<Segment, PatternError> {
    if let Some(marker) = segment.strip_prefix('*') {
        let optional = match marker {
            "" => false,
            "?" => true,
            _ => return Err(PatternError::UnbalancedMarker(segment.to_string())),
        };
        return Ok(Segment::Wildcard {
            name: WILDCARD_KEY.to_string(),
            optional,
        });
    }

    let Some(param) = segment.strip_prefix(':') else {
        return match segment.chars().find(|c| RESERVED.contains(c)) {
            Some(ch) => Err(PatternError::ReservedCharacter {
                ch,
                segment: segment.to_string(),
            }),
            None => Ok(Segment::Static(segment.to_string())),
        };
    };

    let name_end = param
        .find(|c: char| matches!(c, '?' | '*' | '+' | '.'))
        .unwrap_or(param.len());
    let (name, marker) = param.split_at(name_end);
    validate_param_name(name, segment)?;
    let name = name.to_string();

    match marker {
        "" => Ok(Segment::Required(name)),
        "?" => Ok(Segment::Optional(name)),
        "*" => Ok(Segment::Wildcard {
            name,
            optional: false,
        }),
        "*?" => Ok(Segment::Wildcard {
            name,
            optional: true,
        }),
        "+" => Ok(Segment::RequiredWildcard(name)),
        _ => {
            let (optional, suffix) = match marker.strip_prefix('?') {
                Some(rest) => (true, rest),
                None => (false, marker),
            };
            let valid_suffix = suffix.len() > 1
                && suffix.starts_with('.')
                && !suffix.contains(|c: char| RESERVED.contains(&c) || c == '+');
            if valid_suffix {
                Ok(Segment::Suffixed {
                    name,
                    suffix: suffix.to_string(),
                    optional,
                })
            } else {
                Err(PatternError::UnbalancedMarker(segment.to_string()))
            }
        }
    }
}

fn validate_param_name(name: &str, segment: &str) -> Result<(), PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyParamName(segment.to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(PatternError::InvalidParamName {
            name: name.to_string(),
            segment: segment.to_string(),
        });
    }
    Ok(())
}

/// Parse a whole template into segments. Empty segments are skipped, so
/// `/` and the empty string both parse to no segments.
///
/// # Errors
///
/// Returns the first segment error encountered.
pub fn parse_template(template: &str) -> Result<Vec<Segment>, PatternError> {
    template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(classify_segment)
        .collect()
}

/// A compiled matching rule.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    regex: Regex,
    /// Declared parameter names, in capture-group order. `None` means the
    /// names come from the regex itself.
    keys: Option<Vec<String>>,
    loose: bool,
    /// Capture group marking where a loose match stops.
    boundary: Option<usize>,
}

impl CompiledMatcher {
    /// Wrap a precompiled regex. Named groups become parameter names and
    /// every group also gets a positional key.
    #[must_use]
    pub fn from_regex(regex: Regex, loose: bool) -> Self {
        Self {
            regex,
            keys: None,
            loose,
            boundary: None,
        }
    }

    /// Wrap a regex built by a custom parser, with explicit parameter names
    /// for its capture groups.
    #[must_use]
    pub fn with_keys(regex: Regex, keys: Vec<String>, loose: bool) -> Self {
        Self {
            regex,
            keys: Some(keys),
            loose,
            boundary: None,
        }
    }

    /// Compile a template without consulting the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is malformed.
    pub fn from_template(template: &str, loose: bool) -> Result<Self, PatternError> {
        let segments = parse_template(template)?;

        let mut source = String::from("(?i)^");
        for segment in &segments {
            segment.write_regex(&mut source);
        }
        let keys: Vec<String> = segments
            .iter()
            .filter_map(|s| s.param_name().map(str::to_string))
            .collect();

        let boundary = if loose {
            source.push_str("(/|$)");
            Some(keys.len() + 1)
        } else {
            source.push_str("/?$");
            None
        };

        Ok(Self {
            regex: Regex::new(&source)?,
            keys: Some(keys),
            loose,
            boundary,
        })
    }

    /// The underlying regex.
    #[must_use]
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Whether the matcher stops at a prefix boundary instead of requiring
    /// the whole path.
    #[must_use]
    pub fn is_loose(&self) -> bool {
        self.loose
    }

    /// Explicitly declared parameter names, if the matcher has them.
    #[must_use]
    pub fn keys(&self) -> Option<&[String]> {
        self.keys.as_deref()
    }

    pub(crate) fn boundary(&self) -> Option<usize> {
        self.boundary
    }
}

/// Strategy that turns a template into a matcher.
///
/// Routers use [`DefaultParser`] unless configured otherwise.
pub trait PatternParser: Send + Sync {
    /// Compile `template`, loosely when `loose` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is not understood by this parser.
    fn parse(&self, template: &str, loose: bool) -> Result<Arc<CompiledMatcher>, PatternError>;
}

/// The built-in template parser, backed by the process-wide cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultParser;

impl PatternParser for DefaultParser {
    fn parse(&self, template: &str, loose: bool) -> Result<Arc<CompiledMatcher>, PatternError> {
        compile_template(template, loose)
    }
}

/// Process-wide cache, one map per (kind, looseness) pair so lookups can
/// borrow the raw pattern.
struct CompileCache {
    slots: [DashMap<String, Arc<CompiledMatcher>>; 4],
}

impl CompileCache {
    fn slot(&self, regex: bool, loose: bool) -> &DashMap<String, Arc<CompiledMatcher>> {
        &self.slots[usize::from(regex) * 2 + usize::from(loose)]
    }

    fn get_or_compile(
        &self,
        regex: bool,
        raw: &str,
        loose: bool,
        build: impl FnOnce() -> Result<CompiledMatcher, PatternError>,
    ) -> Result<Arc<CompiledMatcher>, PatternError> {
        let slot = self.slot(regex, loose);
        if let Some(hit) = slot.get(raw) {
            return Ok(Arc::clone(hit.value()));
        }

        let compiled = Arc::new(build()?);
        debug!(pattern = %raw, loose, "Compiled route pattern");
        metrics::counter!("waypoint_pattern_compilations_total").increment(1);

        // Another caller may have won the race; keep whichever landed first.
        let entry = slot.entry(raw.to_string()).or_insert(compiled);
        Ok(Arc::clone(entry.value()))
    }
}

static CACHE: Lazy<CompileCache> = Lazy::new(|| CompileCache {
    slots: Default::default(),
});

/// Compile a template through the cache.
///
/// # Errors
///
/// Returns an error if the template is malformed.
pub fn compile_template(template: &str, loose: bool) -> Result<Arc<CompiledMatcher>, PatternError> {
    CACHE.get_or_compile(false, template, loose, || {
        CompiledMatcher::from_template(template, loose)
    })
}

/// Compile any pattern through the cache. Regex patterns bypass the
/// template compiler and are used as given.
///
/// # Errors
///
/// Returns an error if a template is malformed.
pub fn compile(pattern: &Pattern, loose: bool) -> Result<Arc<CompiledMatcher>, PatternError> {
    match pattern {
        Pattern::Template(template) => compile_template(template, loose),
        Pattern::Regex(regex) => CACHE.get_or_compile(true, regex.as_str(), loose, || {
            Ok(CompiledMatcher::from_regex(regex.clone(), loose))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_static() {
        assert_eq!(
            classify_segment("about").unwrap(),
            Segment::Static("about".to_string())
        );
    }

    #[test]
    fn test_classify_params() {
        assert_eq!(
            classify_segment(":id").unwrap(),
            Segment::Required("id".to_string())
        );
        assert_eq!(
            classify_segment(":id?").unwrap(),
            Segment::Optional("id".to_string())
        );
        assert_eq!(
            classify_segment(":title.mp4").unwrap(),
            Segment::Suffixed {
                name: "title".to_string(),
                suffix: ".mp4".to_string(),
                optional: false,
            }
        );
    }

    #[test]
    fn test_classify_wildcards() {
        assert_eq!(
            classify_segment("*").unwrap(),
            Segment::Wildcard {
                name: "*".to_string(),
                optional: false
            }
        );
        assert_eq!(
            classify_segment("*?").unwrap(),
            Segment::Wildcard {
                name: "*".to_string(),
                optional: true
            }
        );
        assert_eq!(
            classify_segment(":rest*").unwrap(),
            Segment::Wildcard {
                name: "rest".to_string(),
                optional: false
            }
        );
        assert_eq!(
            classify_segment(":rest+").unwrap(),
            Segment::RequiredWildcard("rest".to_string())
        );
    }

    #[test]
    fn test_classify_rejects_malformed() {
        assert!(matches!(
            classify_segment(":"),
            Err(PatternError::EmptyParamName(_))
        ));
        assert!(matches!(
            classify_segment(":?"),
            Err(PatternError::EmptyParamName(_))
        ));
        assert!(matches!(
            classify_segment(":id??"),
            Err(PatternError::UnbalancedMarker(_))
        ));
        assert!(matches!(
            classify_segment("**"),
            Err(PatternError::UnbalancedMarker(_))
        ));
        assert!(matches!(
            classify_segment(":rest*x"),
            Err(PatternError::UnbalancedMarker(_))
        ));
        assert!(matches!(
            classify_segment(":a:b"),
            Err(PatternError::InvalidParamName { .. })
        ));
    }

    #[test]
    fn test_classify_rejects_reserved_in_literal() {
        assert!(matches!(
            classify_segment("what?"),
            Err(PatternError::ReservedCharacter { ch: '?', .. })
        ));
        assert!(matches!(
            classify_segment("a*b"),
            Err(PatternError::ReservedCharacter { ch: '*', .. })
        ));
        assert!(matches!(
            classify_segment("a:b"),
            Err(PatternError::ReservedCharacter { ch: ':', .. })
        ));
    }

    #[test]
    fn test_parse_template_skips_empty_segments() {
        assert!(parse_template("/").unwrap().is_empty());
        assert_eq!(parse_template("/a//b/").unwrap().len(), 2);
    }

    #[test]
    fn test_compile_keys_in_order() {
        let compiled = CompiledMatcher::from_template("/:year/:month/*", false).unwrap();
        assert_eq!(
            compiled.keys().unwrap(),
            &["year".to_string(), "month".to_string(), "*".to_string()]
        );
        assert!(!compiled.is_loose());
    }

    #[test]
    fn test_compile_fails_at_compile_time() {
        assert!(compile_template("/users/:", false).is_err());
        assert!(compile_template("/users/:id??", true).is_err());
    }

    #[test]
    fn test_compile_is_cached() {
        let a = compile_template("/cache/:key", true).unwrap();
        let b = compile_template("/cache/:key", true).unwrap();
        let exact = compile_template("/cache/:key", false).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &exact));
    }

    #[test]
    fn test_compile_regex_bypasses_template_compiler() {
        let pattern = Pattern::regex(r"^/raw/(?<id>\d+)").unwrap();
        let compiled = compile(&pattern, false).unwrap();
        assert!(compiled.keys().is_none());
        assert!(Arc::ptr_eq(&compiled, &compile(&pattern, false).unwrap()));
    }
}
