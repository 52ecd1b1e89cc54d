//! In-memory location source for tests and non-browser hosts.

use crate::location::Location;
use crate::source::{LocationSource, NavigateOptions, NavigationError};
use crate::store::{CommitKind, LocationStore};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

/// Memory location options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryOptions {
    /// Initial href, `/` when absent. May carry a query.
    pub path: Option<String>,
    /// Extra query appended to the initial href.
    pub search_path: Option<String>,
    /// Ignore navigations entirely.
    #[serde(rename = "static")]
    pub static_location: bool,
    /// Record every visited href and enable [`MemoryLocation::reset`].
    pub record: bool,
}

impl MemoryOptions {
    /// Options starting at `path`.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Append `search` to the initial href.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search_path = Some(search.into());
        self
    }

    /// Ignore navigations.
    #[must_use]
    pub fn frozen(mut self) -> Self {
        self.static_location = true;
        self
    }

    /// Record visited hrefs.
    #[must_use]
    pub fn recorded(mut self) -> Self {
        self.record = true;
        self
    }

    fn initial_href(&self) -> String {
        let mut href = self.path.clone().unwrap_or_else(|| "/".to_string());
        if let Some(search) = self.search_path.as_deref().filter(|s| !s.is_empty()) {
            let has_query = href
                .split_once('?')
                .is_some_and(|(_, query)| !query.is_empty());
            if has_query {
                href.push('&');
            } else if !href.ends_with('?') {
                href.push('?');
            }
            href.push_str(search);
        }
        href
    }
}

/// A location held entirely in memory.
pub struct MemoryLocation {
    store: LocationStore,
    initial: String,
    static_location: bool,
    history: Option<Mutex<Vec<String>>>,
}

impl MemoryLocation {
    /// Create a memory location from options.
    #[must_use]
    pub fn new(options: MemoryOptions) -> Self {
        let initial = options.initial_href();
        debug!(initial = %initial, record = options.record, "Creating memory location");
        Self {
            store: LocationStore::new(Location::parse(&initial)),
            history: options.record.then(|| Mutex::new(vec![initial.clone()])),
            static_location: options.static_location,
            initial,
        }
    }

    /// Memory location starting at `path`.
    #[must_use]
    pub fn at(path: impl Into<String>) -> Self {
        Self::new(MemoryOptions::at(path))
    }

    /// Visited hrefs, when recording.
    #[must_use]
    pub fn history(&self) -> Option<Vec<String>> {
        self.history.as_ref().map(|history| history.lock().clone())
    }

    /// Forget recorded history and return to the initial href.
    ///
    /// Returns `false` when recording is off, in which case nothing happens.
    pub fn reset(&self) -> bool {
        let Some(history) = &self.history else {
            return false;
        };
        {
            let mut history = history.lock();
            history.clear();
            history.push(self.initial.clone());
        }
        self.store
            .commit(Location::parse(&self.initial), CommitKind::Reset);
        true
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}

impl LocationSource for MemoryLocation {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn store(&self) -> &LocationStore {
        &self.store
    }

    fn navigate(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError> {
        if self.static_location {
            debug!(to = %to, "Static memory location ignores navigation");
            return Ok(());
        }

        if let Some(history) = &self.history {
            let mut history = history.lock();
            if options.replace {
                history.pop();
            }
            history.push(to.to_string());
        }

        let kind = if options.replace {
            CommitKind::Replace
        } else {
            CommitKind::Push
        };
        self.store.commit(Location::parse(to), kind);
        Ok(())
    }
}
