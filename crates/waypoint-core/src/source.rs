//! The location source abstraction.
//!
//! A location source owns a [`LocationStore`] and knows how to move it:
//! browser history, the URL hash, an in-memory stack or a frozen
//! server-rendering location.

use crate::location::Location;
use crate::store::{Listener, LocationStore, Scoping, Subscription, Topic};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Navigation errors.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// No live history is available outside server rendering.
    #[error("History is unavailable in this environment")]
    HostUnavailable,

    /// The target could not be resolved to a same-origin URL.
    #[error("Invalid navigation target: {0}")]
    InvalidUrl(String),

    /// A navigation interceptor rejected or failed the navigation.
    #[error("Navigation interceptor failed: {0}")]
    Interceptor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Options accompanying a navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing a new one.
    pub replace: bool,
    /// History state stored with the entry.
    pub state: Option<Value>,
    /// Hint for interceptors that the change may be animated.
    pub transition: bool,
    /// Extra options forwarded untouched to interceptors and sources.
    pub extensions: Map<String, Value>,
}

impl NavigateOptions {
    /// Options for a replacing navigation.
    #[must_use]
    pub fn replace() -> Self {
        Self {
            replace: true,
            ..Self::default()
        }
    }

    /// Attach history state.
    #[must_use]
    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Mark the navigation as a transition.
    #[must_use]
    pub fn with_transition(mut self) -> Self {
        self.transition = true;
        self
    }

    /// Attach an extra option.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

/// A provider of the current location and a way to change it.
///
/// Implementations must commit the new location to their store before
/// `navigate` returns, so observers see it synchronously.
pub trait LocationSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The store holding this source's location.
    fn store(&self) -> &LocationStore;

    /// Navigate to `to`, an href already resolved against any base.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot navigate in this environment.
    fn navigate(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError>;

    /// The current location.
    fn location(&self) -> Arc<Location> {
        self.store().location()
    }

    /// State stored with the current history entry, if any.
    fn history_state(&self) -> Option<Value> {
        None
    }

    /// Turn an absolute path into an href suitable for links.
    fn format_href(&self, path: &str) -> String {
        path.to_string()
    }

    /// Shorthand for subscribing to this source's store.
    fn subscribe(&self, topic: Topic, scoping: Scoping, listener: Listener) -> Subscription {
        self.store().subscribe(topic, scoping, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_navigate_options_builders() {
        let options = NavigateOptions::replace()
            .with_state(json!({ "modal": true }))
            .with_transition()
            .with_extension("scroll", json!(false));

        assert!(options.replace);
        assert!(options.transition);
        assert_eq!(options.state, Some(json!({ "modal": true })));
        assert_eq!(options.extensions.get("scroll"), Some(&json!(false)));
        assert!(!NavigateOptions::default().replace);
    }

    #[test]
    fn test_interceptor_error_keeps_source() {
        let error = NavigationError::Interceptor("blocked by guard".into());
        assert_eq!(error.to_string(), "Navigation interceptor failed: blocked by guard");
        assert!(std::error::Error::source(&error).is_some());
    }
}
