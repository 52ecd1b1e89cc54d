//! History host abstraction.
//!
//! A [`HistoryHost`] is whatever owns the real session history: a browser
//! window behind a binding layer, or [`InProcessHistory`] for native
//! applications and tests. Hosts must announce their own `push_state` and
//! `replace_state` calls synchronously with [`HostEvent::PushState`] and
//! [`HostEvent::ReplaceState`], so every source sharing the host observes
//! programmatic navigations.

use crate::source::NavigationError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use url::Url;

/// Origin used to resolve relative hrefs.
const ORIGIN: &str = "http://localhost";

/// Events a history host emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEvent {
    /// The user moved through history.
    PopState,
    /// A new entry was pushed.
    PushState,
    /// The current entry was replaced.
    ReplaceState,
    /// The URL fragment changed.
    HashChange,
}

impl HostEvent {
    /// DOM event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PopState => "popstate",
            Self::PushState => "pushState",
            Self::ReplaceState => "replaceState",
            Self::HashChange => "hashchange",
        }
    }
}

/// Callback receiving host events.
pub type HostListener = Arc<dyn Fn(HostEvent) + Send + Sync>;

/// The URL parts a host exposes, formatted like `window.location`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostUrl {
    /// Path, starting with `/`.
    pub pathname: String,
    /// Query with its leading `?`, or empty.
    pub search: String,
    /// Fragment with its leading `#`, or empty.
    pub hash: String,
}

impl HostUrl {
    /// Root URL with no query or fragment.
    #[must_use]
    pub fn root() -> Self {
        Self {
            pathname: "/".to_string(),
            ..Self::default()
        }
    }

    /// Path, query and fragment joined.
    #[must_use]
    pub fn href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }

    /// Resolve `href` relative to this URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `href` is malformed or points at another origin.
    pub fn join(&self, href: &str) -> Result<Self, NavigationError> {
        let invalid = |_| NavigationError::InvalidUrl(href.to_string());
        let origin = Url::parse(ORIGIN).map_err(invalid)?;
        let current = origin.join(&self.href()).map_err(invalid)?;
        let next = current.join(href).map_err(invalid)?;

        if next.origin() != origin.origin() {
            return Err(NavigationError::InvalidUrl(href.to_string()));
        }
        Ok(Self::from_url(&next))
    }

    fn from_url(url: &Url) -> Self {
        let prefixed = |prefix: char, part: Option<&str>| {
            part.filter(|p| !p.is_empty())
                .map(|p| format!("{prefix}{p}"))
                .unwrap_or_default()
        };
        Self {
            pathname: url.path().to_string(),
            search: prefixed('?', url.query()),
            hash: prefixed('#', url.fragment()),
        }
    }
}

/// Owner of the session history.
pub trait HistoryHost: Send + Sync {
    /// Whether a live history exists.
    fn is_available(&self) -> bool {
        true
    }

    /// The current URL.
    fn url(&self) -> HostUrl;

    /// State stored with the current entry.
    fn state(&self) -> Option<Value>;

    /// Push a new entry and emit [`HostEvent::PushState`].
    ///
    /// # Errors
    ///
    /// Returns an error if history is unavailable or the URL is rejected.
    fn push_state(&self, state: Option<Value>, url: &str) -> Result<(), NavigationError>;

    /// Replace the current entry and emit [`HostEvent::ReplaceState`].
    ///
    /// # Errors
    ///
    /// Returns an error if history is unavailable or the URL is rejected.
    fn replace_state(&self, state: Option<Value>, url: &str) -> Result<(), NavigationError>;

    /// Deliver `event` to every listener now.
    fn dispatch(&self, event: HostEvent);

    /// Register a listener; returns its id.
    fn listen(&self, listener: HostListener) -> u64;

    /// Remove a listener.
    fn unlisten(&self, id: u64);
}

#[derive(Debug, Clone)]
struct Entry {
    url: HostUrl,
    state: Option<Value>,
}

#[derive(Debug)]
struct Session {
    entries: Vec<Entry>,
    index: usize,
}

impl Session {
    fn current(&self) -> &Entry {
        &self.entries[self.index]
    }
}

/// Session history kept in process.
///
/// Programmatic `push_state`/`replace_state` announce themselves at once.
/// Traversals ([`back`](Self::back), [`go`](Self::go)) and fragment edits
/// ([`set_hash`](Self::set_hash)) queue their events the way a browser
/// delivers them asynchronously; call [`flush_events`](Self::flush_events)
/// to deliver them.
pub struct InProcessHistory {
    available: bool,
    session: Mutex<Session>,
    listeners: DashMap<u64, HostListener>,
    next_listener: AtomicU64,
    queued: Mutex<VecDeque<HostEvent>>,
}

impl InProcessHistory {
    /// Create a history whose first entry is `href`.
    ///
    /// # Errors
    ///
    /// Returns an error if `href` cannot be resolved.
    pub fn new(href: &str) -> Result<Self, NavigationError> {
        let url = HostUrl::root().join(href)?;
        debug!(url = %url.href(), "Creating in-process history");
        Ok(Self::with_entry(url, true))
    }

    /// A host without live history, as in a non-browser environment.
    /// Reads report `/`; writes fail with [`NavigationError::HostUnavailable`].
    #[must_use]
    pub fn detached() -> Self {
        Self::with_entry(HostUrl::root(), false)
    }

    fn with_entry(url: HostUrl, available: bool) -> Self {
        Self {
            available,
            session: Mutex::new(Session {
                entries: vec![Entry { url, state: None }],
                index: 0,
            }),
            listeners: DashMap::new(),
            next_listener: AtomicU64::new(1),
            queued: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of history entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.session.lock().entries.len()
    }

    /// Whether the history is empty. It never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.session.lock().entries.is_empty()
    }

    /// Position of the current entry.
    #[must_use]
    pub fn index(&self) -> usize {
        self.session.lock().index
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Go back one entry. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        self.go(-1)
    }

    /// Go forward one entry. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Move `delta` entries through history, queueing `popstate` and, when
    /// the fragment differs, `hashchange`.
    pub fn go(&self, delta: isize) -> bool {
        let hash_changed = {
            let mut session = self.session.lock();
            let Some(target) = session
                .index
                .checked_add_signed(delta)
                .filter(|&target| target < session.entries.len())
            else {
                trace!(delta, "History traversal out of range");
                return false;
            };
            if target == session.index {
                return false;
            }
            let before = session.current().url.hash.clone();
            session.index = target;
            session.current().url.hash != before
        };

        let mut queued = self.queued.lock();
        queued.push_back(HostEvent::PopState);
        if hash_changed {
            queued.push_back(HostEvent::HashChange);
        }
        true
    }

    /// Change the fragment as `location.hash = ...` would: a new entry is
    /// pushed and `popstate` plus `hashchange` are queued.
    ///
    /// # Errors
    ///
    /// Returns an error if history is unavailable.
    pub fn set_hash(&self, hash: &str) -> Result<(), NavigationError> {
        if !self.available {
            return Err(NavigationError::HostUnavailable);
        }
        {
            let mut session = self.session.lock();
            let mut url = session.current().url.clone();
            let hash = hash.strip_prefix('#').unwrap_or(hash);
            let next = if hash.is_empty() {
                String::new()
            } else {
                format!("#{hash}")
            };
            if url.hash == next {
                return Ok(());
            }
            url.hash = next;
            Self::push_entry(&mut session, Entry { url, state: None });
        }

        let mut queued = self.queued.lock();
        queued.push_back(HostEvent::PopState);
        queued.push_back(HostEvent::HashChange);
        Ok(())
    }

    /// Deliver queued traversal events. Returns how many were delivered.
    pub fn flush_events(&self) -> usize {
        let mut delivered = 0;
        loop {
            let Some(event) = self.queued.lock().pop_front() else {
                break;
            };
            self.dispatch(event);
            delivered += 1;
        }
        delivered
    }

    /// Number of events waiting for [`flush_events`](Self::flush_events).
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.queued.lock().len()
    }

    fn push_entry(session: &mut Session, entry: Entry) {
        let keep = session.index + 1;
        session.entries.truncate(keep);
        session.entries.push(entry);
        session.index = keep;
    }

    fn write(
        &self,
        state: Option<Value>,
        href: &str,
        event: HostEvent,
    ) -> Result<(), NavigationError> {
        if !self.available {
            warn!(url = %href, "History write without live history");
            return Err(NavigationError::HostUnavailable);
        }
        {
            let mut session = self.session.lock();
            let url = session.current().url.join(href)?;
            let entry = Entry { url, state };
            if event == HostEvent::PushState {
                Self::push_entry(&mut session, entry);
            } else {
                let index = session.index;
                session.entries[index] = entry;
            }
        }
        self.dispatch(event);
        Ok(())
    }
}

impl HistoryHost for InProcessHistory {
    fn is_available(&self) -> bool {
        self.available
    }

    fn url(&self) -> HostUrl {
        self.session.lock().current().url.clone()
    }

    fn state(&self) -> Option<Value> {
        self.session.lock().current().state.clone()
    }

    fn push_state(&self, state: Option<Value>, url: &str) -> Result<(), NavigationError> {
        self.write(state, url, HostEvent::PushState)
    }

    fn replace_state(&self, state: Option<Value>, url: &str) -> Result<(), NavigationError> {
        self.write(state, url, HostEvent::ReplaceState)
    }

    fn dispatch(&self, event: HostEvent) {
        let mut listeners: Vec<(u64, HostListener)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        listeners.sort_by_key(|(id, _)| *id);

        trace!(event = event.as_str(), listeners = listeners.len(), "Host event");
        for (_, listener) in listeners {
            listener(event);
        }
    }

    fn listen(&self, listener: HostListener) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        id
    }

    fn unlisten(&self, id: u64) {
        self.listeners.remove(&id);
    }
}

impl std::fmt::Debug for InProcessHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessHistory")
            .field("available", &self.available)
            .field("url", &self.url())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(history: &InProcessHistory) -> Arc<Mutex<Vec<HostEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        history.listen(Arc::new(move |event| sink.lock().push(event)));
        events
    }

    #[test]
    fn test_host_url_join() {
        let url = HostUrl::root().join("/users?page=2#top").unwrap();
        assert_eq!(url.pathname, "/users");
        assert_eq!(url.search, "?page=2");
        assert_eq!(url.hash, "#top");

        let next = url.join("?page=3").unwrap();
        assert_eq!(next.href(), "/users?page=3");

        let empty = url.join("/plain?#").unwrap();
        assert_eq!(empty.search, "");
        assert_eq!(empty.hash, "");
    }

    #[test]
    fn test_host_url_rejects_other_origin() {
        let result = HostUrl::root().join("https://example.com/evil");
        assert!(matches!(result, Err(NavigationError::InvalidUrl(_))));
    }

    #[test]
    fn test_push_and_replace_emit_synchronously() {
        let history = InProcessHistory::new("/").unwrap();
        let events = record(&history);

        history.push_state(Some(json!(1)), "/a").unwrap();
        history.replace_state(None, "/b").unwrap();

        assert_eq!(
            *events.lock(),
            vec![HostEvent::PushState, HostEvent::ReplaceState]
        );
        assert_eq!(history.url().pathname, "/b");
        assert_eq!(history.len(), 2);
        assert_eq!(history.state(), None);
    }

    #[test]
    fn test_traversal_queues_events() {
        let history = InProcessHistory::new("/a").unwrap();
        history.push_state(Some(json!("b")), "/b#section").unwrap();
        let events = record(&history);

        assert!(history.back());
        assert_eq!(history.url().pathname, "/a");
        assert!(events.lock().is_empty());
        assert_eq!(history.pending_events(), 2);

        assert_eq!(history.flush_events(), 2);
        assert_eq!(
            *events.lock(),
            vec![HostEvent::PopState, HostEvent::HashChange]
        );

        assert!(!history.back());
        assert!(history.forward());
        assert_eq!(history.state(), Some(json!("b")));
    }

    #[test]
    fn test_push_truncates_forward_entries() {
        let history = InProcessHistory::new("/a").unwrap();
        history.push_state(None, "/b").unwrap();
        history.push_state(None, "/c").unwrap();
        history.go(-2);
        history.push_state(None, "/d").unwrap();

        assert_eq!(history.len(), 2);
        assert!(!history.forward());
    }

    #[test]
    fn test_set_hash() {
        let history = InProcessHistory::new("/app").unwrap();
        history.set_hash("#/users").unwrap();
        assert_eq!(history.url().hash, "#/users");
        assert_eq!(history.pending_events(), 2);

        history.flush_events();
        history.set_hash("/users").unwrap();
        assert_eq!(history.pending_events(), 0);
    }

    #[test]
    fn test_detached_history_rejects_writes() {
        let history = InProcessHistory::detached();
        assert!(!history.is_available());
        assert_eq!(history.url(), HostUrl::root());
        assert!(matches!(
            history.push_state(None, "/x"),
            Err(NavigationError::HostUnavailable)
        ));
    }

    #[test]
    fn test_unlisten() {
        let history = InProcessHistory::new("/").unwrap();
        let id = history.listen(Arc::new(|_| {}));
        assert_eq!(history.listener_count(), 1);
        history.unlisten(id);
        assert_eq!(history.listener_count(), 0);
    }
}
