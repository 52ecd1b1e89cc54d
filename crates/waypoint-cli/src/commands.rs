//! Subcommand implementations.
//!
//! Each command returns a JSON report; `main` prints it.

use crate::config::Config;
use crate::metrics;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};
use waypoint_core::{
    BrowserLocation, HistoryHost, InProcessHistory, MemoryLocation, MemoryOptions,
    NavigateOptions, RouterOptions, Scope, Subscription, Switch,
};
use waypoint_pattern::{match_route, DefaultParser, Pattern};

/// Match one pattern against one path.
///
/// # Errors
///
/// Returns an error if the pattern does not compile.
pub fn match_pattern(pattern: &Pattern, path: &str, loose: bool) -> Result<Value> {
    metrics::record_command("match");
    let result = match_route(&DefaultParser, Some(pattern), path, loose)
        .with_context(|| format!("Failed to compile pattern: {pattern}"))?;

    Ok(json!({
        "pattern": pattern.to_string(),
        "path": path,
        "matched": result.is_match(),
        "params": result.params(),
        "base": result.base(),
    }))
}

/// Select the route for `href` from the configured table.
///
/// # Errors
///
/// Returns an error if a pattern in the table is invalid.
pub fn resolve(config: &Config, href: &str) -> Result<Value> {
    metrics::record_command("resolve");
    let memory = MemoryLocation::new(MemoryOptions::at(href).frozen());
    let scope = Scope::new(RouterOptions::new().source(memory).base(&config.base));
    let switch = Switch::new(config.candidates()?);

    let report = match switch.resolve(&scope, None)? {
        Some(matched) => {
            info!(href = %href, route = %matched.selected.value, "Resolved");
            json!({
                "href": href,
                "location": scope.location(),
                "route": matched.selected.value,
                "params": &*matched.params,
                "base": matched.scope.base(),
            })
        }
        None => {
            info!(href = %href, "No route selected");
            json!({
                "href": href,
                "location": scope.location(),
                "route": Value::Null,
            })
        }
    };
    Ok(report)
}

/// One step of a replayed navigation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `push:<href>`
    Push(String),
    /// `replace:<href>`
    Replace(String),
    /// `back`
    Back,
    /// `forward`
    Forward,
    /// `hash:<fragment>`
    Hash(String),
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("push", to)) => Ok(Self::Push(to.to_string())),
            Some(("replace", to)) => Ok(Self::Replace(to.to_string())),
            Some(("hash", hash)) => Ok(Self::Hash(hash.to_string())),
            None if s == "back" => Ok(Self::Back),
            None if s == "forward" => Ok(Self::Forward),
            _ => Err(format!(
                "unknown step `{s}` (expected push:<href>, replace:<href>, hash:<fragment>, back or forward)"
            )),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push(to) => write!(f, "push:{to}"),
            Self::Replace(to) => write!(f, "replace:{to}"),
            Self::Hash(hash) => write!(f, "hash:{hash}"),
            Self::Back => f.write_str("back"),
            Self::Forward => f.write_str("forward"),
        }
    }
}

/// Replay `steps` from `start` over an in-process history and report the
/// notifications each step delivered, in delivery order.
///
/// Every configured route gets a subscription that reports whether the
/// route matches when notified; a root observer reports every commit.
///
/// # Errors
///
/// Returns an error if `start` is not a valid href, a pattern is invalid,
/// or a navigation fails.
pub fn replay(config: &Config, start: &str, steps: &[Step]) -> Result<Value> {
    metrics::record_command("replay");
    let history = Arc::new(
        InProcessHistory::new(start).with_context(|| format!("Invalid start href: {start}"))?,
    );
    let source = BrowserLocation::new(history.clone());
    let scope = Scope::new(RouterOptions::new().source(source).base(&config.base));
    let log: Arc<Mutex<Vec<String>>> = Arc::default();

    let mut subscriptions: Vec<Subscription> = Vec::new();
    subscriptions.push({
        let log = Arc::clone(&log);
        let router = scope.router().clone();
        scope.subscribe_state(Arc::new(move || {
            let location = router.source().location();
            log.lock().push(format!("commit {}", location.href()));
        }))
    });

    for route in &config.routes {
        let handle = Arc::new(scope.route_with(route.pattern()?, route.nest));
        let log = Arc::clone(&log);
        let name = route.name.clone();
        let watched = Arc::clone(&handle);
        subscriptions.push(handle.subscribe(Arc::new(move || {
            let state = match watched.is_match() {
                Ok(true) => "match",
                Ok(false) => "leave",
                Err(_) => "error",
            };
            log.lock().push(format!("{name} {state}"));
        })));
    }
    debug!(observers = subscriptions.len(), "Replay observers attached");

    let mut report = Vec::with_capacity(steps.len());
    for step in steps {
        match step {
            Step::Push(to) => scope.navigate(to, NavigateOptions::default())?,
            Step::Replace(to) => scope.navigate(to, NavigateOptions::replace())?,
            Step::Hash(hash) => history.set_hash(hash)?,
            Step::Back => {
                history.back();
            }
            Step::Forward => {
                history.forward();
            }
        }
        history.flush_events();

        let notifications: Vec<String> = log.lock().drain(..).collect();
        metrics::record_step_notifications(notifications.len());
        report.push(json!({
            "step": step.to_string(),
            "location": history.url().href(),
            "notifications": notifications,
        }));
    }

    Ok(Value::Array(report))
}
