//! Router configuration and inheritance.
//!
//! A [`Router`] bundles a location source with everything needed to turn
//! it into relative locations: base path, pattern parser, href formatting,
//! navigation interception and server-rendering settings. Child routers
//! inherit from their parent unless they bring their own source.

use crate::browser::BrowserLocation;
use crate::host::InProcessHistory;
use crate::location::{absolute_path, relative_path, Location, ABSOLUTE_PREFIX};
use crate::source::{LocationSource, NavigateOptions, NavigationError};
use crate::ssr::{SsrContext, SsrLocation};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use waypoint_pattern::{
    match_route, DefaultParser, MatchResult, Pattern, PatternError, PatternParser,
};

/// Turns an absolute path into a link href.
pub type HrefFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Wraps every navigation. Receives the real navigate function, the
/// resolved target and the options; navigation happens only if the
/// interceptor calls the navigate function.
pub type AroundNav = Arc<
    dyn Fn(
            &dyn Fn(&str, NavigateOptions) -> Result<(), NavigationError>,
            &str,
            NavigateOptions,
        ) -> Result<(), NavigationError>
        + Send
        + Sync,
>;

/// Router options. Unset fields are inherited from the parent router.
#[derive(Clone, Default)]
pub struct RouterOptions {
    /// Location source. Providing one starts a fresh router: nothing is
    /// inherited from the parent.
    pub source: Option<Arc<dyn LocationSource>>,
    /// Separate source for the search string; defaults to `source`.
    pub search_source: Option<Arc<dyn LocationSource>>,
    /// Pattern parser.
    pub parser: Option<Arc<dyn PatternParser>>,
    /// Base path, appended to the parent's base.
    pub base: Option<String>,
    /// Href formatter; defaults to the source's own formatting.
    pub hrefs: Option<HrefFormatter>,
    /// Navigation interceptor.
    pub around_nav: Option<AroundNav>,
    /// Freeze the location at this path for server rendering. A `?`
    /// splits off the search, which then wins over `ssr_search`.
    pub ssr_path: Option<String>,
    /// Search string used while server rendering.
    pub ssr_search: Option<String>,
    /// Receives redirects issued while server rendering.
    pub ssr_context: Option<Arc<SsrContext>>,
}

impl RouterOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `source` for the location.
    #[must_use]
    pub fn source(mut self, source: impl LocationSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Use an already shared source for the location.
    #[must_use]
    pub fn shared_source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Use a separate source for the search string.
    #[must_use]
    pub fn search_source(mut self, source: Arc<dyn LocationSource>) -> Self {
        self.search_source = Some(source);
        self
    }

    /// Use a custom pattern parser.
    #[must_use]
    pub fn parser(mut self, parser: impl PatternParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Set the base path.
    #[must_use]
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Set the href formatter.
    #[must_use]
    pub fn hrefs(mut self, hrefs: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.hrefs = Some(Arc::new(hrefs));
        self
    }

    /// Set the navigation interceptor.
    #[must_use]
    pub fn around_nav(
        mut self,
        around_nav: impl Fn(
                &dyn Fn(&str, NavigateOptions) -> Result<(), NavigationError>,
                &str,
                NavigateOptions,
            ) -> Result<(), NavigationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.around_nav = Some(Arc::new(around_nav));
        self
    }

    /// Render on the server at `path`.
    #[must_use]
    pub fn ssr_path(mut self, path: impl Into<String>) -> Self {
        self.ssr_path = Some(path.into());
        self
    }

    /// Search string for server rendering.
    #[must_use]
    pub fn ssr_search(mut self, search: impl Into<String>) -> Self {
        self.ssr_search = Some(search.into());
        self
    }

    /// Collect server-rendering results into `context`.
    #[must_use]
    pub fn ssr_context(mut self, context: Arc<SsrContext>) -> Self {
        self.ssr_context = Some(context);
        self
    }

    /// `ssr_path` and `ssr_search`, with a `?` in the path taking precedence.
    fn split_ssr(&self) -> (Option<String>, Option<String>) {
        match self.ssr_path.as_deref().map(|path| path.split_once('?')) {
            Some(Some((path, search))) if !search.is_empty() => {
                (Some(path.to_string()), Some(search.to_string()))
            }
            Some(Some((path, _))) => (Some(path.to_string()), self.ssr_search.clone()),
            Some(None) => (self.ssr_path.clone(), self.ssr_search.clone()),
            None => (None, self.ssr_search.clone()),
        }
    }
}

impl fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("source", &self.source.as_ref().map(|s| s.name()))
            .field("base", &self.base)
            .field("custom_parser", &self.parser.is_some())
            .field("custom_hrefs", &self.hrefs.is_some())
            .field("around_nav", &self.around_nav.is_some())
            .field("ssr_path", &self.ssr_path)
            .field("ssr_search", &self.ssr_search)
            .finish()
    }
}

struct RouterInner {
    source: Arc<dyn LocationSource>,
    search_source: Arc<dyn LocationSource>,
    parser: Arc<dyn PatternParser>,
    base: String,
    hrefs: HrefFormatter,
    around_nav: Option<AroundNav>,
    ssr_path: Option<String>,
    ssr_search: Option<String>,
    ssr_context: Option<Arc<SsrContext>>,
}

/// Resolved router settings. Cloning shares the same router.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Create a root router.
    ///
    /// Without a source or `ssr_path` the router reads a host with no live
    /// history: the location is `/` and navigation fails.
    #[must_use]
    pub fn new(options: RouterOptions) -> Self {
        Self::build(None, &options)
    }

    /// Derive a child router.
    #[must_use]
    pub fn child(&self, options: &RouterOptions) -> Self {
        Self::build(Some(self), options)
    }

    fn build(parent: Option<&Router>, options: &RouterOptions) -> Self {
        let parent = if options.source.is_some() { None } else { parent };
        let inherited = parent.map(|p| p.inner.as_ref());

        let (own_ssr_path, own_ssr_search) = options.split_ssr();
        let ssr_context = options
            .ssr_context
            .clone()
            .or_else(|| inherited.and_then(|p| p.ssr_context.clone()));
        let ssr_path = own_ssr_path
            .clone()
            .or_else(|| inherited.and_then(|p| p.ssr_path.clone()));
        let ssr_search = own_ssr_search
            .clone()
            .or_else(|| inherited.and_then(|p| p.ssr_search.clone()));

        let explicit = options.source.clone();
        let source: Arc<dyn LocationSource> = match (&own_ssr_path, &explicit, inherited) {
            (Some(path), _, _) => Arc::new(SsrLocation::new(
                path,
                own_ssr_search.as_deref(),
                ssr_context.clone(),
            )),
            (None, Some(source), _) => Arc::clone(source),
            (None, None, Some(parent)) => Arc::clone(&parent.source),
            (None, None, None) => {
                debug!("Router without a source reads a detached host");
                Arc::new(BrowserLocation::new(Arc::new(InProcessHistory::detached())))
            }
        };
        let source_changed = inherited.map_or(true, |p| !Arc::ptr_eq(&p.source, &source));

        let search_source = match (&options.search_source, inherited) {
            (Some(search), _) => Arc::clone(search),
            (None, Some(parent)) if !source_changed => Arc::clone(&parent.search_source),
            _ => Arc::clone(&source),
        };

        let hrefs = match (&options.hrefs, inherited) {
            (Some(hrefs), _) => Arc::clone(hrefs),
            (None, Some(parent)) => Arc::clone(&parent.hrefs),
            (None, None) => {
                let formatter = explicit.unwrap_or_else(|| Arc::clone(&source));
                Arc::new(move |path: &str| formatter.format_href(path)) as HrefFormatter
            }
        };

        let base = format!(
            "{}{}",
            inherited.map_or("", |p| p.base.as_str()),
            options.base.as_deref().unwrap_or_default()
        );

        let parser = options
            .parser
            .clone()
            .or_else(|| inherited.map(|p| Arc::clone(&p.parser)))
            .unwrap_or_else(|| Arc::new(DefaultParser));

        let around_nav = options
            .around_nav
            .clone()
            .or_else(|| inherited.and_then(|p| p.around_nav.clone()));

        Self {
            inner: Arc::new(RouterInner {
                source,
                search_source,
                parser,
                base,
                hrefs,
                around_nav,
                ssr_path,
                ssr_search,
                ssr_context,
            }),
        }
    }

    /// Accumulated base path.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.inner.base
    }

    /// Location source.
    #[must_use]
    pub fn source(&self) -> &Arc<dyn LocationSource> {
        &self.inner.source
    }

    /// Search string source.
    #[must_use]
    pub fn search_source(&self) -> &Arc<dyn LocationSource> {
        &self.inner.search_source
    }

    /// Pattern parser.
    #[must_use]
    pub fn parser(&self) -> &Arc<dyn PatternParser> {
        &self.inner.parser
    }

    /// Navigation interceptor, if any.
    #[must_use]
    pub fn around_nav(&self) -> Option<&AroundNav> {
        self.inner.around_nav.as_ref()
    }

    /// Server-rendering path, if rendering on a server.
    #[must_use]
    pub fn ssr_path(&self) -> Option<&str> {
        self.inner.ssr_path.as_deref()
    }

    /// Server-rendering search string. `None` outside server rendering
    /// unless explicitly set.
    #[must_use]
    pub fn ssr_search(&self) -> Option<&str> {
        self.inner.ssr_search.as_deref()
    }

    /// Server-rendering context, if any.
    #[must_use]
    pub fn ssr_context(&self) -> Option<&Arc<SsrContext>> {
        self.inner.ssr_context.as_ref()
    }

    /// Whether both handles refer to the same router.
    #[must_use]
    pub fn ptr_eq(&self, other: &Router) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// `location` as seen from this router's base.
    #[must_use]
    pub fn location_at(&self, location: &Location) -> String {
        relative_path(&self.inner.base, location.path())
    }

    /// The current location relative to the base.
    #[must_use]
    pub fn location(&self) -> String {
        self.location_at(&self.inner.source.location())
    }

    /// The current sanitised search string.
    #[must_use]
    pub fn search(&self) -> String {
        self.inner.search_source.location().search().to_string()
    }

    /// Navigate to `to`, relative to the base unless prefixed with `~`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot navigate or the interceptor
    /// fails.
    pub fn navigate(&self, to: &str, options: NavigateOptions) -> Result<(), NavigationError> {
        let target = absolute_path(to, &self.inner.base);
        let source = &self.inner.source;
        debug!(to = %to, target = %target, source = source.name(), "Navigating");

        match &self.inner.around_nav {
            Some(around_nav) => {
                let perform = |to: &str, options: NavigateOptions| source.navigate(to, options);
                around_nav(&perform, &target, options)
            }
            None => source.navigate(&target, options),
        }
    }

    /// Link href for `to`: the base is prepended unless `to` starts with
    /// `~`, then the formatter is applied.
    #[must_use]
    pub fn href(&self, to: &str) -> String {
        let path = absolute_path(to, &self.inner.base);
        (self.inner.hrefs)(&path)
    }

    /// Match `pattern` against the current relative location.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern fails to compile.
    pub fn match_route(
        &self,
        pattern: Option<&Pattern>,
        loose: bool,
    ) -> Result<MatchResult, PatternError> {
        self.match_at(&self.inner.source.location(), pattern, loose)
    }

    /// Match `pattern` against `location` as seen from this router.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern fails to compile.
    pub fn match_at(
        &self,
        location: &Location,
        pattern: Option<&Pattern>,
        loose: bool,
    ) -> Result<MatchResult, PatternError> {
        let path = self.location_at(location);
        match_route(self.inner.parser.as_ref(), pattern, &path, loose)
    }

    /// Whether `to` points at the current location.
    #[must_use]
    pub fn is_active(&self, to: &str) -> bool {
        match to.strip_prefix(ABSOLUTE_PREFIX) {
            Some(absolute) => self.inner.source.location().path() == absolute,
            None => self.location() == to,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterOptions::default())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("source", &self.inner.source.name())
            .field("base", &self.inner.base)
            .field("around_nav", &self.inner.around_nav.is_some())
            .field("ssr_path", &self.inner.ssr_path)
            .finish()
    }
}
