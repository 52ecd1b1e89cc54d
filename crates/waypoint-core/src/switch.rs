//! Exclusive routing: pick the first matching candidate.

use crate::location::Location;
use crate::scope::{Arm, ParamsCache, Scope};
use crate::store::{Listener, Scoping, Subscription, Topic};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use waypoint_pattern::{match_route, MatchResult, Params, Pattern, PatternError, PatternParser};

/// One child of a switch.
#[derive(Debug, Clone)]
pub enum Candidate<T> {
    /// A route; without a pattern it matches everything.
    Route {
        /// Pattern to match, `None` for a fallback.
        pattern: Option<Pattern>,
        /// Match as a prefix and give the contents the matched base.
        nest: bool,
        /// Payload handed back when selected.
        value: T,
    },
    /// A group whose children are considered in place.
    Fragment(Vec<Candidate<T>>),
    /// Anything that is not a route; never selected.
    Other(T),
}

impl<T> Candidate<T> {
    /// An exactly matched route.
    pub fn route(pattern: impl Into<Pattern>, value: T) -> Self {
        Self::Route {
            pattern: Some(pattern.into()),
            nest: false,
            value,
        }
    }

    /// A nested route.
    pub fn nested(pattern: impl Into<Pattern>, value: T) -> Self {
        Self::Route {
            pattern: Some(pattern.into()),
            nest: true,
            value,
        }
    }

    /// A route without a pattern.
    pub fn fallback(value: T) -> Self {
        Self::Route {
            pattern: None,
            nest: false,
            value,
        }
    }

    /// A group of candidates.
    pub fn fragment(children: impl IntoIterator<Item = Candidate<T>>) -> Self {
        Self::Fragment(children.into_iter().collect())
    }
}

/// The selected candidate.
#[derive(Debug)]
pub struct Selected<'a, T> {
    /// Position among the flattened route candidates.
    pub index: usize,
    /// The candidate's payload.
    pub value: &'a T,
    /// The candidate's pattern.
    pub pattern: Option<&'a Pattern>,
    /// Whether the candidate is nested.
    pub nest: bool,
    /// The successful match.
    pub result: MatchResult,
}

fn flatten<'a, T>(
    candidates: &'a [Candidate<T>],
    out: &mut Vec<(Option<&'a Pattern>, bool, &'a T)>,
) {
    for candidate in candidates {
        match candidate {
            Candidate::Route {
                pattern,
                nest,
                value,
            } => out.push((pattern.as_ref(), *nest, value)),
            Candidate::Fragment(children) => flatten(children, out),
            Candidate::Other(_) => {}
        }
    }
}

/// Select the first route candidate matching `path`, in document order.
/// Fragments are flattened and non-route candidates ignored.
///
/// # Errors
///
/// Returns an error if a pattern tried before the match fails to compile.
pub fn select<'a, T>(
    parser: &dyn PatternParser,
    candidates: &'a [Candidate<T>],
    path: &str,
) -> Result<Option<Selected<'a, T>>, PatternError> {
    let mut routes = Vec::new();
    flatten(candidates, &mut routes);

    for (index, (pattern, nest, value)) in routes.into_iter().enumerate() {
        let result = match_route(parser, pattern, path, nest)?;
        if result.is_match() {
            trace!(index, pattern = ?pattern.map(Pattern::as_str), path = %path, "Switch selected");
            return Ok(Some(Selected {
                index,
                value,
                pattern,
                nest,
                result,
            }));
        }
    }
    Ok(None)
}

/// A selected candidate plus the scope for its contents.
pub struct SwitchMatch<'a, T> {
    /// The selection.
    pub selected: Selected<'a, T>,
    /// Parameters merged over the enclosing scope's.
    pub params: Arc<Params>,
    /// Scope for the selected route's contents.
    pub scope: Scope,
}

impl<T: fmt::Debug> fmt::Debug for SwitchMatch<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwitchMatch")
            .field("selected", &self.selected)
            .field("params", &self.params)
            .finish()
    }
}

/// A reusable switch over a fixed list of candidates.
///
/// Re-resolving while the same candidate stays selected with the same
/// parameter values returns the same params `Arc`. The scope handed to the
/// selected candidate stays tied to that selection: once another candidate
/// would win, subscriptions made inside it go quiet.
pub struct Switch<T> {
    candidates: Vec<Candidate<T>>,
    arms: Arc<[Arm]>,
    cache: ParamsCache,
}

impl<T> Switch<T> {
    /// Create a switch.
    #[must_use]
    pub fn new(candidates: Vec<Candidate<T>>) -> Self {
        let mut routes = Vec::new();
        flatten(&candidates, &mut routes);
        let arms: Arc<[Arm]> = routes
            .into_iter()
            .map(|(pattern, nest, _)| (pattern.cloned(), nest))
            .collect();

        Self {
            candidates,
            arms,
            cache: ParamsCache::default(),
        }
    }

    /// The candidates.
    #[must_use]
    pub fn candidates(&self) -> &[Candidate<T>] {
        &self.candidates
    }

    /// Resolve against `scope`'s location, or against `location` when
    /// given. With an override, the returned scope keeps evaluating its
    /// selection against that path.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn resolve(
        &self,
        scope: &Scope,
        location: Option<&str>,
    ) -> Result<Option<SwitchMatch<'_, T>>, PatternError> {
        let current;
        let path = match location {
            Some(path) => path,
            None => {
                current = scope.location();
                current.as_str()
            }
        };

        let Some(selected) = select(scope.router().parser().as_ref(), &self.candidates, path)?
        else {
            return Ok(None);
        };

        let own = selected.result.params().cloned().unwrap_or_default();
        let params = self
            .cache
            .intern(selected.index, Params::merge_scoped(&scope.params(), &own));
        let child = scope.enter_switch_arm(
            &self.arms,
            selected.index,
            location,
            selected.result.base(),
            Arc::clone(&params),
        );

        Ok(Some(SwitchMatch {
            selected,
            params,
            scope: child,
        }))
    }

    /// Listen for path changes in `scope` that change which candidate is
    /// selected, or move within the current one. The listener hears a new
    /// selection before anything subscribed inside the newly selected
    /// candidate.
    pub fn subscribe(&self, scope: &Scope, listener: Listener) -> Subscription {
        let store = scope.router().source().store().clone();
        let selection = Arc::new(scope.switch_selection(store.id(), Arc::clone(&self.arms)));
        let last = Arc::new(Mutex::new(selection(&store.location())));

        let unchanged = {
            let (selection, last) = (Arc::clone(&selection), Arc::clone(&last));
            Arc::new(move |location: &Location| selection(location) == *last.lock())
        };
        let notify: Listener = {
            let store = store.clone();
            Arc::new(move || {
                let now = selection(&store.location());
                trace!(selected = ?now, "Switch selection observed");
                *last.lock() = now;
                listener();
            })
        };
        store.subscribe(Topic::Path, Scoping::Boundary(unchanged), notify)
    }
}

impl<T> FromIterator<Candidate<T>> for Switch<T> {
    fn from_iter<I: IntoIterator<Item = Candidate<T>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLocation;
    use crate::router::RouterOptions;
    use crate::source::{LocationSource, NavigateOptions};
    use waypoint_pattern::DefaultParser;

    fn scope_at(path: &str) -> (Arc<MemoryLocation>, Scope) {
        let memory = Arc::new(MemoryLocation::at(path));
        let scope = Scope::new(RouterOptions::new().shared_source(memory.clone()));
        (memory, scope)
    }

    #[test]
    fn test_empty_switch() {
        let candidates: Vec<Candidate<&str>> = Vec::new();
        assert!(select(&DefaultParser, &candidates, "/").unwrap().is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let candidates = vec![
            Candidate::route("/users/:id", "user"),
            Candidate::route("/users/:id", "shadowed"),
            Candidate::route("/users/*", "catch-all"),
        ];
        let selected = select(&DefaultParser, &candidates, "/users/1").unwrap().unwrap();
        assert_eq!(*selected.value, "user");
        assert_eq!(selected.index, 0);
    }

    #[test]
    fn test_ignores_non_routes_and_flattens() {
        let candidates = vec![
            Candidate::Other("text"),
            Candidate::fragment([
                Candidate::Other("nested text"),
                Candidate::route("/about", "about"),
            ]),
            Candidate::route("/about", "late"),
        ];
        let selected = select(&DefaultParser, &candidates, "/about").unwrap().unwrap();
        assert_eq!(*selected.value, "about");
        assert_eq!(selected.index, 0);

        assert!(select(&DefaultParser, &[Candidate::Other("x")], "/").unwrap().is_none());
    }

    #[test]
    fn test_fallback_matches_everything() {
        let candidates = vec![
            Candidate::route("/", "home"),
            Candidate::fallback("not found"),
        ];
        let selected = select(&DefaultParser, &candidates, "/missing").unwrap().unwrap();
        assert_eq!(*selected.value, "not found");
        assert_eq!(selected.result.params().unwrap().get("*"), Some("missing"));
    }

    #[test]
    fn test_wildcard_catch_all() {
        let candidates = vec![
            Candidate::route("/", "home"),
            Candidate::route("/:anything*", "catch-all"),
        ];
        let selected = select(&DefaultParser, &candidates, "/something-different")
            .unwrap()
            .unwrap();
        assert_eq!(*selected.value, "catch-all");
    }

    #[test]
    fn test_location_override() {
        let (_memory, scope) = scope_at("/");
        let switch: Switch<&str> = [
            Candidate::route("/", "home"),
            Candidate::route("/users", "users"),
        ]
        .into_iter()
        .collect();

        let selected = switch.resolve(&scope, Some("/users")).unwrap().unwrap();
        assert_eq!(*selected.selected.value, "users");

        let selected = switch.resolve(&scope, None).unwrap().unwrap();
        assert_eq!(*selected.selected.value, "home");
    }

    #[test]
    fn test_nested_candidate_scope() {
        let (_memory, scope) = scope_at("/dashboard/settings");
        let switch = Switch::new(vec![
            Candidate::route("/", "home"),
            Candidate::nested("/dashboard", "dashboard"),
        ]);

        let matched = switch.resolve(&scope, None).unwrap().unwrap();
        assert_eq!(matched.scope.base(), "/dashboard");
        assert_eq!(matched.scope.location(), "/settings");
    }

    #[test]
    fn test_selected_scope_follows_selection() {
        let (memory, scope) = scope_at("/x");
        let switch = Switch::new(vec![
            Candidate::route("/page/:pageId", "page"),
            Candidate::route("/:anything*", "default"),
        ]);
        let matched = switch.resolve(&scope, None).unwrap().unwrap();
        assert_eq!(*matched.selected.value, "default");

        let log: Arc<Mutex<Vec<&str>>> = Arc::default();
        let push = |entry: &'static str| {
            let log = Arc::clone(&log);
            Arc::new(move || log.lock().push(entry)) as Listener
        };
        let _content = matched.scope.subscribe_location(push("default-content"));
        let _owner = switch.subscribe(&scope, push("owner"));

        memory.navigate("/page/1", NavigateOptions::default()).unwrap();
        assert_eq!(*log.lock(), vec!["owner"]);
        assert_eq!(*switch.resolve(&scope, None).unwrap().unwrap().selected.value, "page");

        memory.navigate("/y", NavigateOptions::default()).unwrap();
        assert_eq!(*log.lock(), vec!["owner", "owner", "default-content"]);
    }

    #[test]
    fn test_subscription_within_selection() {
        let (memory, scope) = scope_at("/a");
        let switch = Switch::new(vec![
            Candidate::route("/a", "a"),
            Candidate::fallback("other"),
        ]);
        let calls = Arc::new(Mutex::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            switch.subscribe(&scope, Arc::new(move || *calls.lock() += 1))
        };

        memory.navigate("/b", NavigateOptions::default()).unwrap();
        memory.navigate("/c", NavigateOptions::default()).unwrap();
        memory.navigate("/a", NavigateOptions::default()).unwrap();
        assert_eq!(*calls.lock(), 3);
    }

    #[test]
    fn test_override_pins_selected_scope() {
        let (memory, scope) = scope_at("/");
        let switch = Switch::new(vec![
            Candidate::route("/", "home"),
            Candidate::route("/users", "users"),
        ]);
        let matched = switch.resolve(&scope, Some("/users")).unwrap().unwrap();

        let calls = Arc::new(Mutex::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            matched
                .scope
                .subscribe_location(Arc::new(move || *calls.lock() += 1))
        };
        memory.navigate("/other", NavigateOptions::default()).unwrap();
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_params_removed_when_absent() {
        let (memory, scope) = scope_at("/products/categories/apple/page/1");
        let switch = Switch::new(vec![
            Candidate::route("/products/categories/:category", "category"),
            Candidate::route("/products/categories/:category/page/:page", "page"),
        ]);

        let first = switch.resolve(&scope, None).unwrap().unwrap();
        assert_eq!(first.params.get("page"), Some("1"));
        let again = switch.resolve(&scope, None).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first.params, &again.params));

        memory
            .navigate("/products/categories/apple", NavigateOptions::default())
            .unwrap();
        let second = switch.resolve(&scope, None).unwrap().unwrap();
        assert_eq!(second.params.get("category"), Some("apple"));
        assert!(!second.params.contains_key("page"));
    }
}
