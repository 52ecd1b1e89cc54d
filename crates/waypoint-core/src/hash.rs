//! Location source that keeps the path in the URL fragment (`#/path`).

use crate::host::{HistoryHost, HostEvent, HostUrl};
use crate::location::{decode_uri, Location};
use crate::source::{LocationSource, NavigateOptions, NavigationError};
use crate::store::{CommitKind, LocationStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Strip one leading `#` and then one leading `/`.
fn strip_hash_prefix(value: &str) -> &str {
    let value = value.strip_prefix('#').unwrap_or(value);
    value.strip_prefix('/').unwrap_or(value)
}

fn read_location(url: &HostUrl) -> Location {
    Location::new(
        format!("/{}", decode_uri(strip_hash_prefix(&url.hash))),
        &url.search,
    )
}

/// Path from the fragment, search from the real query string.
///
/// Entries written by this source are committed with their own kind; other
/// host events commit only when the fragment-derived location differs, so
/// pathname changes made by other code do not notify its observers.
pub struct HashLocation {
    host: Arc<dyn HistoryHost>,
    store: LocationStore,
    listener: u64,
}

impl HashLocation {
    /// Attach to `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HistoryHost>) -> Self {
        let store = LocationStore::new(read_location(&host.url()));

        let listener = {
            let store = store.clone();
            let weak_host = Arc::downgrade(&host);
            host.listen(Arc::new(move |event| {
                let kind = match event {
                    HostEvent::PushState => CommitKind::Push,
                    HostEvent::ReplaceState => CommitKind::Replace,
                    HostEvent::HashChange => CommitKind::Pop,
                    HostEvent::PopState => return,
                };
                let Some(host) = weak_host.upgrade() else {
                    return;
                };
                let next = read_location(&host.url());
                if next != *store.location() {
                    store.commit(next, kind);
                }
            }))
        };

        debug!(available = host.is_available(), "Hash location attached");
        Self {
            host,
            store,
            listener,
        }
    }

    /// The underlying host.
    #[must_use]
    pub fn host(&self) -> &Arc<dyn HistoryHost> {
        &self.host
    }
}

impl LocationSource for HashLocation {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn store(&self) -> &LocationStore {
        &self.store
    }

    /// Accepts `/path`, `path`, `#/path` or `#path`. A `?` in the target
    /// replaces the real query string; without one the query is kept.
    fn navigate(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError> {
        if !self.host.is_available() {
            warn!(to = %to, "Navigation without live history");
            return Err(NavigationError::HostUnavailable);
        }

        let target = strip_hash_prefix(to);
        let (hash, search) = match target.split_once('?') {
            Some((hash, search)) => (hash, Some(search).filter(|s| !s.is_empty())),
            None => (target, None),
        };

        let current = self.host.url();
        let search = search.map_or(current.search, |s| format!("?{s}"));
        let url = format!("{}{}#/{}", current.pathname, search, hash);

        if options.replace {
            self.host.replace_state(options.state, &url)
        } else {
            self.host.push_state(options.state, &url)
        }
    }

    fn history_state(&self) -> Option<Value> {
        self.host.state()
    }

    fn format_href(&self, path: &str) -> String {
        format!("#{path}")
    }
}

impl Drop for HashLocation {
    fn drop(&mut self) {
        self.host.unlisten(self.listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::InProcessHistory;
    use crate::store::{Scoping, Topic};
    use parking_lot::Mutex;
    use serde_json::json;

    fn setup(href: &str) -> (Arc<InProcessHistory>, HashLocation) {
        let history = Arc::new(InProcessHistory::new(href).unwrap());
        let source = HashLocation::new(history.clone());
        (history, source)
    }

    #[test]
    fn test_reads_path_from_hash() {
        let (_history, source) = setup("/app?x=1#/users/1");
        assert_eq!(source.location().path(), "/users/1");
        assert_eq!(source.location().search(), "x=1");

        let (_history, source) = setup("/#users");
        assert_eq!(source.location().path(), "/users");

        let (_history, source) = setup("/");
        assert_eq!(source.location().path(), "/");
    }

    #[test]
    fn test_navigate_keeps_pathname_and_search() {
        let (history, source) = setup("/app?x=1");
        source.navigate("/users", NavigateOptions::default()).unwrap();

        let url = history.url();
        assert_eq!(url.pathname, "/app");
        assert_eq!(url.search, "?x=1");
        assert_eq!(url.hash, "#/users");
        assert_eq!(source.location().path(), "/users");
    }

    #[test]
    fn test_navigate_with_search_replaces_query() {
        let (history, source) = setup("/app?x=1");
        source.navigate("#/users?page=2", NavigateOptions::default()).unwrap();

        assert_eq!(history.url().search, "?page=2");
        assert_eq!(source.location().search(), "page=2");
    }

    #[test]
    fn test_prefix_insensitive_navigation() {
        let (_history, source) = setup("/");
        for target in ["/a", "a", "#/a", "#a"] {
            source.navigate(target, NavigateOptions::default()).unwrap();
            assert_eq!(source.location().path(), "/a");
        }
    }

    #[test]
    fn test_history_stack_and_state() {
        let (history, source) = setup("/");
        source
            .navigate("/app/users", NavigateOptions::replace())
            .unwrap();
        assert_eq!(history.len(), 1);

        source
            .navigate(
                "/app/users/2",
                NavigateOptions::default().with_state(json!({ "id": 2 })),
            )
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(source.history_state(), Some(json!({ "id": 2 })));
    }

    #[test]
    fn test_ignores_pathname_changes() {
        let (history, source) = setup("/#/home");
        let calls = Arc::new(Mutex::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            source.subscribe(Topic::Any, Scoping::Global, Arc::new(move || *calls.lock() += 1))
        };

        history.push_state(None, "/elsewhere#/home").unwrap();
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_own_navigation_notifies_once() {
        let (history, source) = setup("/");
        let calls = Arc::new(Mutex::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            source.subscribe(Topic::Path, Scoping::Global, Arc::new(move || *calls.lock() += 1))
        };

        source.navigate("/inbox", NavigateOptions::default()).unwrap();
        history.flush_events();
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_commits_carry_navigation_kind() {
        let (history, source) = setup("/");
        source.navigate("/a", NavigateOptions::default()).unwrap();
        assert_eq!(source.store().stats().last_commit, Some(CommitKind::Push));

        source.navigate("/b", NavigateOptions::replace()).unwrap();
        assert_eq!(source.store().stats().last_commit, Some(CommitKind::Replace));

        history.back();
        history.flush_events();
        assert_eq!(source.location().path(), "/");
        assert_eq!(source.store().stats().last_commit, Some(CommitKind::Pop));
    }

    #[test]
    fn test_shared_host_browser_commits_once() {
        let (history, source) = setup("/");
        let browser = crate::browser::BrowserLocation::new(history.clone());
        let calls = Arc::new(Mutex::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            browser.subscribe(Topic::Any, Scoping::Global, Arc::new(move || *calls.lock() += 1))
        };

        source.navigate("/inbox", NavigateOptions::default()).unwrap();
        assert_eq!(*calls.lock(), 1);
        assert_eq!(browser.store().version(), 1);
        assert_eq!(source.store().version(), 1);
    }

    #[test]
    fn test_fragment_path_is_decoded() {
        let (history, source) = setup("/");
        source.navigate("/users/jöhn doe", NavigateOptions::default()).unwrap();
        assert_ne!(history.url().hash, "#/users/jöhn doe");
        assert_eq!(source.location().path(), "/users/jöhn doe");

        let (_history, source) = setup("/#/%not-valid");
        assert_eq!(source.location().path(), "/%not-valid");
    }

    #[test]
    fn test_follows_queued_hash_changes() {
        let (history, source) = setup("/");
        history.set_hash("#/settings").unwrap();
        assert_eq!(source.location().path(), "/");

        history.flush_events();
        assert_eq!(source.location().path(), "/settings");
    }

    #[test]
    fn test_format_href() {
        let (_history, source) = setup("/");
        assert_eq!(source.format_href("/app"), "#/app");
    }
}
