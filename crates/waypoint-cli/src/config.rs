//! Route table configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (WAYPOINT_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use waypoint_core::Candidate;
use waypoint_pattern::{Pattern, PatternSpec};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base path of the router the table is mounted under.
    #[serde(default = "default_base")]
    pub base: String,

    /// Routes in declaration order.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One entry of the route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Name printed when the route is selected.
    pub name: String,

    /// A template string or `{ regex = "..." }`; omitted for a fallback.
    #[serde(default)]
    pub pattern: Option<Value>,

    /// Match as a prefix and nest the contents under the matched part.
    #[serde(default)]
    pub nest: bool,
}

fn default_base() -> String {
    std::env::var("WAYPOINT_BASE").unwrap_or_default()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base: default_base(),
            routes: Vec::new(),
        }
    }
}

impl RouteConfig {
    /// The route's pattern, `None` for a fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a string or regex object, or
    /// the regex does not compile.
    pub fn pattern(&self) -> Result<Option<Pattern>> {
        let Some(value) = &self.pattern else {
            return Ok(None);
        };
        let spec = PatternSpec::try_from(value.clone())
            .with_context(|| format!("Invalid pattern for route `{}`", self.name))?;
        let pattern = spec
            .into_pattern()
            .with_context(|| format!("Failed to compile pattern for route `{}`", self.name))?;
        Ok(Some(pattern))
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "waypoint.toml",
            "/etc/waypoint/waypoint.toml",
            "~/.config/waypoint/waypoint.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Switch candidates for the route table, carrying route names.
    ///
    /// # Errors
    ///
    /// Returns an error if any route's pattern is invalid.
    pub fn candidates(&self) -> Result<Vec<Candidate<String>>> {
        self.routes
            .iter()
            .map(|route| {
                Ok(Candidate::Route {
                    pattern: route.pattern()?,
                    nest: route.nest,
                    value: route.name.clone(),
                })
            })
            .collect()
    }
}
