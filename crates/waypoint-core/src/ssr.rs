//! Frozen location used while rendering on a server.

use crate::location::Location;
use crate::source::{LocationSource, NavigateOptions, NavigationError};
use crate::store::LocationStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Collects the outcome of a server render, shared with the caller.
#[derive(Debug, Default)]
pub struct SsrContext {
    redirect_to: Mutex<Option<String>>,
}

impl SsrContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last redirect requested during the render.
    #[must_use]
    pub fn redirect_to(&self) -> Option<String> {
        self.redirect_to.lock().clone()
    }

    /// Take the redirect, leaving the context empty.
    pub fn take_redirect(&self) -> Option<String> {
        self.redirect_to.lock().take()
    }

    fn record_redirect(&self, to: &str) {
        *self.redirect_to.lock() = Some(to.to_string());
    }
}

/// A location that never moves. Navigations are recorded as redirects in
/// the attached [`SsrContext`].
#[derive(Debug)]
pub struct SsrLocation {
    store: LocationStore,
    context: Option<Arc<SsrContext>>,
}

impl SsrLocation {
    /// Freeze the location at `path`. A `?` inside `path` splits off the
    /// search, which then wins over `search`.
    #[must_use]
    pub fn new(path: &str, search: Option<&str>, context: Option<Arc<SsrContext>>) -> Self {
        let location = match path.split_once('?') {
            Some((path, inline)) if !inline.is_empty() => Location::new(path, inline),
            Some((path, _)) => Location::new(path, search.unwrap_or_default()),
            None => Location::new(path, search.unwrap_or_default()),
        };
        debug!(location = %location, "Creating server-rendering location");
        Self {
            store: LocationStore::new(location),
            context,
        }
    }

    /// The attached context, if any.
    #[must_use]
    pub fn context(&self) -> Option<&Arc<SsrContext>> {
        self.context.as_ref()
    }
}

impl LocationSource for SsrLocation {
    fn name(&self) -> &'static str {
        "ssr"
    }

    fn store(&self) -> &LocationStore {
        &self.store
    }

    fn navigate(&self, to: &str, _options: NavigateOptions) -> Result<(), NavigationError> {
        debug!(to = %to, "Recording redirect during server render");
        if let Some(context) = &self.context {
            context.record_redirect(to);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frozen_location() {
        let ssr = SsrLocation::new("/users/1", Some("tab=info"), None);
        assert_eq!(ssr.location().path(), "/users/1");
        assert_eq!(ssr.location().search(), "tab=info");

        ssr.navigate("/elsewhere", NavigateOptions::default()).unwrap();
        assert_eq!(ssr.location().path(), "/users/1");
    }

    #[test]
    fn test_inline_search_wins() {
        let ssr = SsrLocation::new("/catalog?sort=price", Some("sort=name"), None);
        assert_eq!(ssr.location().path(), "/catalog");
        assert_eq!(ssr.location().search(), "sort=price");
    }

    #[test]
    fn test_records_redirect() {
        let context = Arc::new(SsrContext::new());
        let ssr = SsrLocation::new("/old", None, Some(context.clone()));

        ssr.navigate("/new", NavigateOptions::replace()).unwrap();
        assert_eq!(context.redirect_to().as_deref(), Some("/new"));
        assert_eq!(context.take_redirect().as_deref(), Some("/new"));
        assert_eq!(context.redirect_to(), None);
    }
}
