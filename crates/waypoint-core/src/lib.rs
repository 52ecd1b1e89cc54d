//! # waypoint-core
//!
//! Location stores, location sources, routers and scopes for the Waypoint
//! navigation layer.
//!
//! This crate provides the building blocks of client-side navigation:
//!
//! - **Store** - Versioned location snapshot with ordered, scoped observers
//! - **Source** - Browser history, hash, in-memory and server-rendering locations
//! - **Router** - Base path, parser, href formatting and navigation interception
//! - **Scope** - Nested routes with merged parameters
//! - **Switch** - Exclusive selection among route candidates
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ HistoryHost │────▶│   Source    │────▶│    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲                   │
//!                            │ navigate          ▼ notify
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │   Router    │◀────│    Scope    │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use waypoint_core::{MemoryLocation, NavigateOptions, RouterOptions, Scope};
//!
//! let scope = Scope::new(RouterOptions::new().source(MemoryLocation::at("/users/42")));
//! let user = scope.route("/users/:id").resolve().unwrap().unwrap();
//! assert_eq!(user.params.get("id"), Some("42"));
//!
//! scope.navigate("/about", NavigateOptions::default()).unwrap();
//! assert!(scope.route("/users/:id").resolve().unwrap().is_none());
//! ```

pub mod browser;
pub mod hash;
pub mod host;
pub mod location;
pub mod memory;
pub mod router;
pub mod scope;
pub mod search;
pub mod source;
pub mod ssr;
pub mod store;
pub mod switch;

pub use browser::BrowserLocation;
pub use hash::HashLocation;
pub use host::{HistoryHost, HostEvent, HostListener, HostUrl, InProcessHistory};
pub use location::{absolute_path, relative_path, sanitize_search, Location, ABSOLUTE_PREFIX};
pub use memory::{MemoryLocation, MemoryOptions};
pub use router::{AroundNav, HrefFormatter, Router, RouterOptions};
pub use scope::{ResolvedRoute, RouteHandle, Scope};
pub use search::SearchParams;
pub use source::{LocationSource, NavigateOptions, NavigationError};
pub use ssr::{SsrContext, SsrLocation};
pub use store::{
    CommitKind, Listener, LocationStore, ScopePredicate, Scoping, StoreStats, Subscription, Topic,
};
pub use switch::{select, Candidate, Selected, Switch, SwitchMatch};

pub use waypoint_pattern::{MatchResult, Params, Pattern, PatternError, PatternParser};
