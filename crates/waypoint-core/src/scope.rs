//! Scopes: the router and parameters visible at one point of a route tree.
//!
//! A [`Scope`] is what a rendered component sees. Declaring a route under a
//! scope yields a [`RouteHandle`]; resolving the handle against the current
//! location yields the child scope when the route matches.
//!
//! Every scope remembers the chain of routers and routes above it, so a
//! route can be re-evaluated from the root against any location snapshot.
//! That is what keeps nested routes from ever observing a location their
//! ancestors have stopped matching.

use crate::location::Location;
use crate::router::{Router, RouterOptions};
use crate::search::SearchParams;
use crate::source::{NavigateOptions, NavigationError};
use crate::store::{Listener, LocationStore, Scoping, Subscription, Topic};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use waypoint_pattern::{match_route, MatchResult, Params, Pattern, PatternError};

/// One flattened switch candidate: its pattern and nest flag.
pub(crate) type Arm = (Option<Pattern>, bool);

enum NodeKind {
    Root(Router),
    Router(RouterOptions),
    Route {
        pattern: Option<Pattern>,
        nest: bool,
    },
    /// Matches only while its switch still selects `index`.
    SwitchArm {
        arms: Arc<[Arm]>,
        index: usize,
        location: Option<String>,
    },
}

struct ScopeNode {
    parent: Option<Arc<ScopeNode>>,
    kind: NodeKind,
}

/// A location snapshot standing in for one store's current value.
struct Pin<'a> {
    store: u64,
    location: &'a Location,
}

impl ScopeNode {
    fn child(parent: &Arc<ScopeNode>, kind: NodeKind) -> Arc<ScopeNode> {
        Arc::new(ScopeNode {
            parent: Some(Arc::clone(parent)),
            kind,
        })
    }

    fn is_routed(&self) -> bool {
        matches!(self.kind, NodeKind::Route { .. } | NodeKind::SwitchArm { .. })
            || self.parent.as_ref().is_some_and(|parent| parent.is_routed())
    }

    /// Walk the chain from the root. `None` when some route on the way
    /// does not match.
    fn evaluate(&self, pin: Option<&Pin<'_>>) -> Result<Option<(Router, Params)>, PatternError> {
        let parent = match &self.parent {
            Some(parent) => parent.evaluate(pin)?,
            None => None,
        };

        match &self.kind {
            NodeKind::Root(router) => Ok(Some((router.clone(), Params::new()))),
            NodeKind::Router(options) => {
                Ok(parent.map(|(router, params)| (router.child(options), params)))
            }
            NodeKind::Route { pattern, nest } => {
                let Some((router, params)) = parent else {
                    return Ok(None);
                };
                let path = relative_at(&router, pin);
                let result = match_route(router.parser().as_ref(), pattern.as_ref(), &path, *nest)?;
                Ok(enter_match(&router, &params, *nest, result))
            }
            NodeKind::SwitchArm {
                arms,
                index,
                location,
            } => {
                let (Some((router, params)), Some((_, nest))) = (parent, arms.get(*index)) else {
                    return Ok(None);
                };
                let path = match location {
                    Some(path) => path.clone(),
                    None => relative_at(&router, pin),
                };
                match pick_arm(&router, arms, &path)? {
                    Some((picked, result)) if picked == *index => {
                        Ok(enter_match(&router, &params, *nest, result))
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    fn matches_at(&self, store: u64, location: &Location) -> bool {
        matches!(
            self.evaluate(Some(&Pin { store, location })),
            Ok(Some(_))
        )
    }
}

/// The path `router` sees, taken from the pinned snapshot when it belongs
/// to the router's store.
fn relative_at(router: &Router, pin: Option<&Pin<'_>>) -> String {
    match pin {
        Some(pin) if pin.store == router.source().store().id() => {
            router.location_at(pin.location)
        }
        _ => router.location(),
    }
}

fn enter_match(
    router: &Router,
    params: &Params,
    nest: bool,
    result: MatchResult,
) -> Option<(Router, Params)> {
    let router = nested_router(router, nest, result.base());
    result
        .into_params()
        .map(|own| (router, Params::merge_scoped(params, &own)))
}

/// First arm matching `path`.
fn pick_arm(
    router: &Router,
    arms: &[Arm],
    path: &str,
) -> Result<Option<(usize, MatchResult)>, PatternError> {
    for (index, (pattern, nest)) in arms.iter().enumerate() {
        let result = match_route(router.parser().as_ref(), pattern.as_ref(), path, *nest)?;
        if result.is_match() {
            return Ok(Some((index, result)));
        }
    }
    Ok(None)
}

/// The router for the contents of a matched route.
fn nested_router(router: &Router, nest: bool, base: &str) -> Router {
    if nest && !base.is_empty() {
        router.child(&RouterOptions::new().base(base))
    } else {
        router.clone()
    }
}

/// Keeps the previous params object while the values stay equal.
#[derive(Default)]
pub(crate) struct ParamsCache {
    last: Mutex<Option<(usize, Arc<Params>)>>,
}

impl ParamsCache {
    pub(crate) fn intern(&self, slot: usize, next: Params) -> Arc<Params> {
        let mut last = self.last.lock();
        match last.as_ref() {
            Some((previous_slot, previous)) if *previous_slot == slot && **previous == next => {
                Arc::clone(previous)
            }
            _ => {
                let fresh = Arc::new(next);
                *last = Some((slot, Arc::clone(&fresh)));
                fresh
            }
        }
    }
}

/// The router and parameters visible at one point of the route tree.
#[derive(Clone)]
pub struct Scope {
    node: Arc<ScopeNode>,
    router: Router,
    params: Arc<Params>,
}

impl Scope {
    /// The top-level scope of `router`.
    #[must_use]
    pub fn root(router: Router) -> Self {
        Self {
            node: Arc::new(ScopeNode {
                parent: None,
                kind: NodeKind::Root(router.clone()),
            }),
            router,
            params: Arc::new(Params::new()),
        }
    }

    /// Shorthand for a root scope over `Router::new(options)`.
    #[must_use]
    pub fn new(options: RouterOptions) -> Self {
        Self::root(Router::new(options))
    }

    /// A scope whose router is derived from this one with `options`.
    #[must_use]
    pub fn with_router(&self, options: RouterOptions) -> Self {
        let router = self.router.child(&options);
        Self {
            node: ScopeNode::child(&self.node, NodeKind::Router(options)),
            router,
            params: Arc::clone(&self.params),
        }
    }

    /// Enter the arm a switch selected without re-evaluating the chain.
    /// Later evaluations re-run the selection, against `location` when
    /// given.
    pub(crate) fn enter_switch_arm(
        &self,
        arms: &Arc<[Arm]>,
        index: usize,
        location: Option<&str>,
        base: &str,
        params: Arc<Params>,
    ) -> Self {
        let nest = arms.get(index).is_some_and(|(_, nest)| *nest);
        let kind = NodeKind::SwitchArm {
            arms: Arc::clone(arms),
            index,
            location: location.map(str::to_string),
        };
        Self {
            node: ScopeNode::child(&self.node, kind),
            router: nested_router(&self.router, nest, base),
            params,
        }
    }

    /// Which of `arms` a switch in this scope selects at a snapshot of
    /// store `store`. `None` while this scope itself is not matched.
    pub(crate) fn switch_selection(
        &self,
        store: u64,
        arms: Arc<[Arm]>,
    ) -> impl Fn(&Location) -> Option<usize> + Send + Sync + 'static {
        let node = Arc::clone(&self.node);
        move |location: &Location| {
            let pin = Pin { store, location };
            let (router, _) = node.evaluate(Some(&pin)).ok().flatten()?;
            let path = relative_at(&router, Some(&pin));
            pick_arm(&router, &arms, &path)
                .ok()
                .flatten()
                .map(|(index, _)| index)
        }
    }

    /// The router in effect.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Accumulated base path.
    #[must_use]
    pub fn base(&self) -> &str {
        self.router.base()
    }

    /// Parameters of the enclosing routes; the innermost route wins.
    #[must_use]
    pub fn params(&self) -> Arc<Params> {
        Arc::clone(&self.params)
    }

    /// The current location relative to the base.
    #[must_use]
    pub fn location(&self) -> String {
        self.router.location()
    }

    /// Navigate relative to the base (`~` for absolute targets).
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot navigate or an interceptor
    /// fails.
    pub fn navigate(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError> {
        self.router.navigate(to, options)
    }

    /// Navigate as a side effect of rendering. While server rendering this
    /// records the target in the render context instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot navigate or an interceptor
    /// fails.
    pub fn redirect(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError> {
        trace!(to = %to, "Redirecting");
        self.router.navigate(to, options)
    }

    /// The current sanitised search string.
    #[must_use]
    pub fn search(&self) -> String {
        self.router.search()
    }

    /// The search string as structured parameters.
    #[must_use]
    pub fn search_params(&self) -> SearchParams {
        SearchParams::parse(&self.search())
    }

    /// Update the search parameters and navigate to the current location
    /// with the new search string.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigation fails.
    pub fn set_search_params(
        &self,
        update: impl FnOnce(&mut SearchParams),
        options: NavigateOptions,
    ) -> Result<(), NavigationError> {
        let mut params = self.search_params();
        update(&mut params);
        self.router
            .navigate(&format!("{}?{}", self.location(), params), options)
    }

    /// State stored with the current history entry.
    #[must_use]
    pub fn history_state(&self) -> Option<Value> {
        self.router.source().history_state()
    }

    /// Link href for `to`.
    #[must_use]
    pub fn href(&self, to: &str) -> String {
        self.router.href(to)
    }

    /// Whether a link to `to` would point at the current location.
    #[must_use]
    pub fn is_active(&self, to: &str) -> bool {
        self.router.is_active(to)
    }

    /// Match `pattern` exactly against the current location without
    /// entering a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern fails to compile.
    pub fn match_route(&self, pattern: impl Into<Pattern>) -> Result<MatchResult, PatternError> {
        self.router.match_route(Some(&pattern.into()), false)
    }

    /// Declare a route matched exactly.
    #[must_use]
    pub fn route(&self, pattern: impl Into<Pattern>) -> RouteHandle {
        self.route_with(Some(pattern.into()), false)
    }

    /// Declare a nested route: matched as a prefix, its contents get the
    /// matched part as base.
    #[must_use]
    pub fn nest(&self, pattern: impl Into<Pattern>) -> RouteHandle {
        self.route_with(Some(pattern.into()), true)
    }

    /// Declare a route without a pattern; it matches everything.
    #[must_use]
    pub fn fallback(&self) -> RouteHandle {
        self.route_with(None, false)
    }

    /// Declare a route.
    #[must_use]
    pub fn route_with(&self, pattern: Option<Pattern>, nest: bool) -> RouteHandle {
        RouteHandle {
            node: ScopeNode::child(&self.node, NodeKind::Route { pattern, nest }),
            store: self.router.source().store().clone(),
            cache: ParamsCache::default(),
        }
    }

    /// Listen for path changes. Inside a route, the listener is silent
    /// while the route does not match.
    pub fn subscribe_location(&self, listener: Listener) -> Subscription {
        self.subscribe(self.router.source().store(), Topic::Path, listener)
    }

    /// Listen for search string changes.
    pub fn subscribe_search(&self, listener: Listener) -> Subscription {
        self.subscribe(self.router.search_source().store(), Topic::Search, listener)
    }

    /// Listen for every commit, including history state changes.
    pub fn subscribe_state(&self, listener: Listener) -> Subscription {
        self.subscribe(self.router.source().store(), Topic::Any, listener)
    }

    fn subscribe(
        &self,
        store: &LocationStore,
        topic: Topic,
        listener: Listener,
    ) -> Subscription {
        let scoping = if self.node.is_routed() {
            let node = Arc::clone(&self.node);
            let id = store.id();
            Scoping::Within(Arc::new(move |location: &Location| {
                node.matches_at(id, location)
            }))
        } else {
            Scoping::Global
        };
        store.subscribe(topic, scoping, listener)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("router", &self.router)
            .field("params", &self.params)
            .finish()
    }
}

/// A matched route: its merged parameters and the scope for its contents.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    /// Parameters of this route merged over its ancestors'.
    pub params: Arc<Params>,
    /// Scope for the route's contents.
    pub scope: Scope,
}

/// A route declared under a scope.
pub struct RouteHandle {
    node: Arc<ScopeNode>,
    store: LocationStore,
    cache: ParamsCache,
}

impl RouteHandle {
    /// The route's pattern; `None` for a fallback.
    #[must_use]
    pub fn pattern(&self) -> Option<&Pattern> {
        match &self.node.kind {
            NodeKind::Route { pattern, .. } => pattern.as_ref(),
            _ => None,
        }
    }

    /// Whether the route is nested.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        matches!(self.node.kind, NodeKind::Route { nest: true, .. })
    }

    /// Evaluate the route against the current location.
    ///
    /// The whole chain of enclosing routes is evaluated, so a route whose
    /// ancestor no longer matches resolves to `None`. While the merged
    /// parameters keep the same values, the same `Arc` is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern on the chain fails to compile.
    pub fn resolve(&self) -> Result<Option<ResolvedRoute>, PatternError> {
        let Some((router, params)) = self.node.evaluate(None)? else {
            return Ok(None);
        };
        let params = self.cache.intern(0, params);
        Ok(Some(ResolvedRoute {
            scope: Scope {
                node: Arc::clone(&self.node),
                router,
                params: Arc::clone(&params),
            },
            params,
        }))
    }

    /// Whether the route currently matches.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern on the chain fails to compile.
    pub fn is_match(&self) -> Result<bool, PatternError> {
        Ok(self.node.evaluate(None)?.is_some())
    }

    /// Listen for path changes that affect this route, including the one
    /// that makes it stop matching.
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let node = Arc::clone(&self.node);
        let id = self.store.id();
        let predicate = Arc::new(move |location: &Location| node.matches_at(id, location));
        self.store
            .subscribe(Topic::Path, Scoping::Boundary(predicate), listener)
    }
}

impl fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandle")
            .field("pattern", &self.pattern())
            .field("nest", &self.is_nested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLocation, MemoryOptions};
    use crate::source::LocationSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scope_at(path: &str) -> (Arc<MemoryLocation>, Scope) {
        let memory = Arc::new(MemoryLocation::at(path));
        let scope = Scope::new(RouterOptions::new().shared_source(memory.clone()));
        (memory, scope)
    }

    fn params_of(handle: &RouteHandle) -> Arc<Params> {
        handle.resolve().unwrap().unwrap().params
    }

    #[test]
    fn test_root_scope_has_no_params() {
        let (_memory, scope) = scope_at("/");
        assert!(scope.params().is_empty());
        assert_eq!(scope.location(), "/");
    }

    #[test]
    fn test_fallback_route_exposes_wildcard() {
        let (_memory, scope) = scope_at("/app-2/goods/tees");
        let params = params_of(&scope.fallback());
        assert_eq!(params.get("0"), Some("app-2/goods/tees"));
        assert_eq!(params.get("*"), Some("app-2/goods/tees"));
    }

    #[test]
    fn test_nested_params_inner_wins() {
        let (_memory, scope) = scope_at("/app/users/1/maria");
        let outer = scope.route("/app/:foo/*");
        let outer_scope = outer.resolve().unwrap().unwrap().scope;
        let inner = outer_scope.route("/app/users/:id/:name");

        let params = params_of(&inner);
        assert_eq!(params.get("0"), Some("1"));
        assert_eq!(params.get("1"), Some("maria"));
        assert_eq!(params.get("id"), Some("1"));
        assert_eq!(params.get("name"), Some("maria"));
        assert_eq!(params.get("foo"), Some("users"));
    }

    #[test]
    fn test_nested_route_sets_base() {
        let memory = MemoryLocation::new(MemoryOptions::at("/2012/04/posts").frozen());
        let scope = Scope::new(RouterOptions::new().source(memory));

        let dated = scope.nest("/:year/:month").resolve().unwrap().unwrap();
        assert_eq!(dated.scope.base(), "/2012/04");
        assert_eq!(dated.scope.location(), "/posts");

        let posts = dated.scope.route("/posts").resolve().unwrap().unwrap();
        assert_eq!(posts.scope.base(), "/2012/04");
        assert_eq!(posts.params.get("year"), Some("2012"));
    }

    #[test]
    fn test_nested_inside_base_router() {
        let memory =
            MemoryLocation::new(MemoryOptions::at("/app/users/alexey/settings/all").frozen());
        let scope = Scope::new(RouterOptions::new().source(memory).base("/app"));

        let user = scope.nest("/users/:name").resolve().unwrap().unwrap();
        assert!(!user.scope.route("/settings").is_match().unwrap());

        let settings = user.scope.nest("/settings").resolve().unwrap().unwrap();
        assert_eq!(settings.scope.base(), "/app/users/alexey/settings");
        assert!(settings.scope.route("/all").is_match().unwrap());
    }

    #[test]
    fn test_params_identity_is_stable() {
        let (memory, scope) = scope_at("/users/1");
        let route = scope.route("/users/:id");

        let first = params_of(&route);
        let second = params_of(&route);
        assert!(Arc::ptr_eq(&first, &second));

        memory.navigate("/users/1?tab=info", NavigateOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &params_of(&route)));

        memory.navigate("/users/2", NavigateOptions::default()).unwrap();
        let third = params_of(&route);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.get("id"), Some("2"));
    }

    #[test]
    fn test_child_route_unmatched_when_parent_leaves() {
        let (memory, scope) = scope_at("/users/1");
        let users = scope.nest("/users").resolve().unwrap().unwrap();
        let detail = users.scope.route("/:id");
        assert!(detail.is_match().unwrap());

        memory.navigate("/1", NavigateOptions::default()).unwrap();
        assert!(!detail.is_match().unwrap());
        assert!(detail.resolve().unwrap().is_none());
    }

    #[test]
    fn test_route_subscription_hears_leave() {
        let (memory, scope) = scope_at("/a");
        let route = scope.route("/a");
        let calls = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            route.subscribe(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
        };

        memory.navigate("/b", NavigateOptions::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        memory.navigate("/c", NavigateOptions::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        memory.navigate("/a", NavigateOptions::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scoped_location_subscription_is_silent_outside() {
        let (memory, scope) = scope_at("/a/1");
        let inside = scope.nest("/a").resolve().unwrap().unwrap().scope;
        let calls = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let calls = Arc::clone(&calls);
            inside.subscribe_location(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
        };

        memory.navigate("/a/2", NavigateOptions::default()).unwrap();
        memory.navigate("/b", NavigateOptions::default()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_search_params_round_trip_through_navigation() {
        let (memory, scope) = scope_at("/catalog?sort=name");
        assert_eq!(scope.search_params().get("sort"), Some("name"));

        scope
            .set_search_params(|params| params.set("page", "2"), NavigateOptions::default())
            .unwrap();
        assert_eq!(memory.location().href(), "/catalog?sort=name&page=2");
    }

    #[test]
    fn test_with_router_extends_base() {
        let (memory, scope) = scope_at("/");
        let nested = scope.with_router(RouterOptions::new().base("/admin"));
        nested.navigate("/users", NavigateOptions::default()).unwrap();

        assert_eq!(memory.location().path(), "/admin/users");
        assert_eq!(nested.location(), "/users");
        assert!(nested.route("/users").is_match().unwrap());
        assert_eq!(nested.href("/x"), "/admin/x");
    }

    #[test]
    fn test_match_route_does_not_enter_scope() {
        let (_memory, scope) = scope_at("/users/7");
        let result = scope.match_route("/users/:id").unwrap();
        assert_eq!(result.params().unwrap().get("id"), Some("7"));
        assert!(!scope.match_route("/users").unwrap().is_match());
    }
}
