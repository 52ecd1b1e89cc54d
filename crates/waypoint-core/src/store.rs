//! Shared location store with ordered change notification.
//!
//! Every location source owns one [`LocationStore`]. A navigation commits a
//! new [`Location`] snapshot and then notifies observers in three phases:
//!
//! 1. scope owners whose scope stopped matching, innermost first
//! 2. observers whose scope keeps matching (or that have no scope)
//! 3. observers whose scope started matching
//!
//! Observers living inside a scope are never notified with a location their
//! scope rejects; tearing them down is the scope owner's job. Each observer
//! remembers the last snapshot it was notified for, and a navigation started
//! from inside a listener restarts dispatch against the newest snapshot.

use crate::location::Location;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Callback invoked when an observed part of the location changes.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Predicate telling whether an observer's scope matches a location.
pub type ScopePredicate = Arc<dyn Fn(&Location) -> bool + Send + Sync>;

/// Source of unique store ids.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Part of the location an observer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Path changes only.
    Path,
    /// Search string changes only.
    Search,
    /// Every commit, including ones that only carry new history state.
    Any,
}

impl Topic {
    fn changed(self, prev: &Location, next: &Location) -> bool {
        match self {
            Self::Path => prev.path() != next.path(),
            Self::Search => prev.search() != next.search(),
            Self::Any => true,
        }
    }
}

/// How an observer relates to a route scope.
#[derive(Clone)]
pub enum Scoping {
    /// Hears every change of its topic.
    Global,
    /// Lives inside a scope and hears changes only while it matches.
    Within(ScopePredicate),
    /// Owns a scope and also hears the change that leaves it.
    Boundary(ScopePredicate),
}

impl Scoping {
    fn matches(&self, location: &Location) -> bool {
        match self {
            Self::Global => true,
            Self::Within(predicate) | Self::Boundary(predicate) => predicate(location),
        }
    }
}

impl fmt::Debug for Scoping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "Global",
            Self::Within(_) => "Within",
            Self::Boundary(_) => "Boundary",
        })
    }
}

/// What produced a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitKind {
    /// A new history entry.
    Push,
    /// The current history entry was replaced.
    Replace,
    /// The host moved through history (back/forward, hash edits).
    Pop,
    /// A recorded memory history was reset.
    Reset,
}

impl CommitKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Replace => "replace",
            Self::Pop => "pop",
            Self::Reset => "reset",
        }
    }
}

struct Observer {
    order: u64,
    topic: Topic,
    scoping: Scoping,
    listener: Listener,
    seen: ArcSwap<Location>,
    active: AtomicBool,
}

#[derive(Default)]
struct DispatchState {
    running: bool,
    pending: bool,
}

struct StoreInner {
    id: u64,
    current: ArcSwap<Location>,
    version: AtomicU64,
    observers: DashMap<u64, Arc<Observer>>,
    next_observer: AtomicU64,
    dispatch: Mutex<DispatchState>,
    last_kind: Mutex<Option<CommitKind>>,
}

/// Resets the dispatch flag even if a listener panics.
struct DispatchGuard<'a>(&'a StoreInner);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.0.dispatch.lock();
        state.running = false;
        state.pending = false;
    }
}

/// Current location snapshot plus the observers interested in it.
///
/// Cloning is cheap and yields a handle to the same store.
#[derive(Clone)]
pub struct LocationStore {
    inner: Arc<StoreInner>,
}

impl LocationStore {
    /// Create a store holding `initial`.
    #[must_use]
    pub fn new(initial: Location) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                current: ArcSwap::from_pointee(initial),
                version: AtomicU64::new(0),
                observers: DashMap::new(),
                next_observer: AtomicU64::new(1),
                dispatch: Mutex::new(DispatchState::default()),
                last_kind: Mutex::new(None),
            }),
        }
    }

    /// Process-unique id of this store.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The committed snapshot.
    #[must_use]
    pub fn location(&self) -> Arc<Location> {
        self.inner.current.load_full()
    }

    /// Number of commits so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    /// Register `listener` for changes to `topic`.
    pub fn subscribe(&self, topic: Topic, scoping: Scoping, listener: Listener) -> Subscription {
        let id = self.inner.next_observer.fetch_add(1, Ordering::Relaxed);
        let observer = Observer {
            order: id,
            topic,
            scoping,
            listener,
            seen: ArcSwap::new(self.location()),
            active: AtomicBool::new(true),
        };
        self.inner.observers.insert(id, Arc::new(observer));

        trace!(store = self.inner.id, observer = id, ?topic, "Subscribed");

        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Commit `next` and notify observers before returning.
    pub fn commit(&self, next: Location, kind: CommitKind) {
        debug!(
            store = self.inner.id,
            kind = kind.as_str(),
            location = %next,
            "Committing location"
        );
        self.inner.current.store(Arc::new(next));
        self.inner.version.fetch_add(1, Ordering::AcqRel);
        *self.inner.last_kind.lock() = Some(kind);
        metrics::counter!("waypoint_location_commits_total", "kind" => kind.as_str()).increment(1);

        self.dispatch();
    }

    /// Get store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            observer_count: self.inner.observers.len(),
            version: self.version(),
            last_commit: *self.inner.last_kind.lock(),
        }
    }

    fn dispatch(&self) {
        {
            let mut state = self.inner.dispatch.lock();
            if state.running {
                state.pending = true;
                trace!(store = self.inner.id, "Dispatch deferred to running cycle");
                return;
            }
            state.running = true;
        }

        let _guard = DispatchGuard(&self.inner);
        loop {
            self.run_cycle();

            let mut state = self.inner.dispatch.lock();
            if !state.pending {
                break;
            }
            state.pending = false;
        }
    }

    fn run_cycle(&self) {
        let current = self.inner.current.load_full();
        let version = self.version();

        let mut observers: Vec<Arc<Observer>> = self
            .inner
            .observers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        observers.sort_by_key(|observer| observer.order);

        let mut leaving = Vec::new();
        let mut staying = Vec::new();
        let mut entering = Vec::new();

        for observer in observers {
            let seen = observer.seen.load_full();
            if Arc::ptr_eq(&seen, &current) {
                continue;
            }
            if !observer.topic.changed(&seen, &current) {
                observer.seen.store(Arc::clone(&current));
                continue;
            }
            let was = observer.scoping.matches(&seen);
            let now = observer.scoping.matches(&current);
            match (was, now, &observer.scoping) {
                (true, false, Scoping::Boundary(_)) => leaving.push(observer),
                (true, true, _) => staying.push(observer),
                (false, true, _) => entering.push(observer),
                _ => observer.seen.store(Arc::clone(&current)),
            }
        }

        trace!(
            store = self.inner.id,
            leaving = leaving.len(),
            staying = staying.len(),
            entering = entering.len(),
            "Dispatching"
        );

        leaving.reverse();
        for observer in leaving.into_iter().chain(staying).chain(entering) {
            if self.version() != version {
                trace!(store = self.inner.id, "Cycle superseded by a newer commit");
                return;
            }
            if !observer.active.load(Ordering::Acquire) {
                continue;
            }
            observer.seen.store(Arc::clone(&current));
            (observer.listener)();
        }
    }
}

impl fmt::Debug for LocationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocationStore")
            .field("id", &self.inner.id)
            .field("location", &self.location())
            .field("observers", &self.inner.observers.len())
            .finish()
    }
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Number of registered observers.
    pub observer_count: usize,
    /// Number of commits so far.
    pub version: u64,
    /// Kind of the most recent commit.
    pub last_commit: Option<CommitKind>,
}

/// Registration handle; the listener is removed when this is dropped.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    /// Observer id within its store.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.store.upgrade() else {
            return;
        };
        if let Some((_, observer)) = inner.observers.remove(&self.id) {
            observer.active.store(false, Ordering::Release);
            trace!(store = inner.id, observer = self.id, "Unsubscribed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
