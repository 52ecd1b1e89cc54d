//! Location source backed by the host's session history.

use crate::host::{HistoryHost, HostEvent, HostUrl};
use crate::location::{decode_uri, Location};
use crate::source::{LocationSource, NavigateOptions, NavigationError};
use crate::store::{CommitKind, LocationStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// The host keeps the pathname percent-encoded; observers see it decoded.
fn read_location(url: &HostUrl) -> Location {
    Location::new(decode_uri(&url.pathname), &url.search)
}

fn commit_kind(event: HostEvent) -> CommitKind {
    match event {
        HostEvent::PushState => CommitKind::Push,
        HostEvent::ReplaceState => CommitKind::Replace,
        HostEvent::PopState | HostEvent::HashChange => CommitKind::Pop,
    }
}

/// Path and search from the host URL.
///
/// Create one per host and share it; every router using it observes the
/// same store. The store follows `popstate`, `pushState`, `replaceState`
/// and `hashchange`, so navigations made by other code sharing the host
/// are picked up too.
pub struct BrowserLocation {
    host: Arc<dyn HistoryHost>,
    store: LocationStore,
    listener: u64,
}

impl BrowserLocation {
    /// Attach to `host`.
    #[must_use]
    pub fn new(host: Arc<dyn HistoryHost>) -> Self {
        let store = LocationStore::new(read_location(&host.url()));

        let listener = {
            let store = store.clone();
            let weak_host = Arc::downgrade(&host);
            host.listen(Arc::new(move |event| {
                let Some(host) = weak_host.upgrade() else {
                    return;
                };
                store.commit(read_location(&host.url()), commit_kind(event));
            }))
        };

        debug!(available = host.is_available(), "Browser location attached");
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

impl LocationSource for BrowserLocation {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn store(&self) -> &LocationStore {
        &self.store
    }

    fn navigate(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError> {
        if !self.host.is_available() {
            warn!(to = %to, "Navigation without live history");
            return Err(NavigationError::HostUnavailable);
        }
        if options.replace {
            self.host.replace_state(options.state, to)
        } else {
            self.host.push_state(options.state, to)
        }
    }

    fn history_state(&self) -> Option<Value> {
        self.host.state()
    }
}

impl Drop for BrowserLocation {
    fn drop(&mut self) {
        self.host.unlisten(self.listener);
    }
}
