//! # waypoint-pattern
//!
//! Route pattern compilation and matching for the Waypoint navigation layer.
//!
//! This crate is pure: apart from a process-wide compile cache it holds no
//! state and performs no I/O.
//!
//! ## Pattern grammar
//!
//! - `/users` - literal segments
//! - `/users/:id` - one required segment
//! - `/users/:id?` - optional segment
//! - `/docs/*`, `/docs/:rest*` - remainder of the path
//! - `/docs/*?` - optional remainder
//!
//! ## Example
//!
//! ```rust
//! use waypoint_pattern::{compile_template, match_path};
//!
//! let matcher = compile_template("/users/:id", false).unwrap();
//! let result = match_path(&matcher, "/users/42");
//!
//! assert!(result.is_match());
//! assert_eq!(result.params().unwrap().get("id"), Some("42"));
//! ```

pub mod compile;
pub mod matcher;
pub mod pattern;

pub use compile::{
    classify_segment, compile, compile_template, parse_template, CompiledMatcher,
    DefaultParser, PatternError, PatternParser, Segment, DEFAULT_PATTERN, WILDCARD_KEY,
};
pub use matcher::{is_positional_key, match_path, match_route, MatchResult, Params};
pub use pattern::{MatchTypeError, Pattern, PatternSpec};
