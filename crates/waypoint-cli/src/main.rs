//! # Waypoint CLI
//!
//! Inspect route patterns and navigation behaviour from the command line.
//!
//! ## Usage
//!
//! ```bash
//! # Match a pattern against a path
//! waypoint match '/users/:id' /users/42
//!
//! # Resolve an href against the route table in waypoint.toml
//! waypoint resolve /app/users/42
//!
//! # Replay a navigation sequence and print the notifications
//! waypoint replay --start /a push:/b back
//!
//! # Use another config file and base
//! WAYPOINT_BASE=/app waypoint --config routes.toml resolve /app/docs
//! ```

mod commands;
mod config;
mod metrics;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::Step;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint_pattern::Pattern;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Inspect Waypoint route patterns and navigation", long_about = None)]
struct Cli {
    /// Route table to load instead of the default search path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a pattern against a path
    Match {
        /// Template such as `/users/:id`
        pattern: String,
        /// Path to test
        path: String,
        /// Allow the pattern to match a prefix
        #[arg(long)]
        loose: bool,
        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,
    },
    /// Select the route for an href from the route table
    Resolve {
        /// Path with optional search
        href: String,
    },
    /// Replay navigation steps and print delivered notifications
    Replay {
        /// Initial href
        #[arg(long, default_value = "/")]
        start: String,
        /// push:<href>, replace:<href>, hash:<fragment>, back or forward
        steps: Vec<Step>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypoint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    metrics::init_metrics();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };
    tracing::debug!(base = %config.base, routes = config.routes.len(), "Configuration loaded");

    let report = match cli.command {
        Commands::Match {
            pattern,
            path,
            loose,
            regex,
        } => {
            let pattern = if regex {
                Pattern::regex(&pattern)?
            } else {
                Pattern::template(pattern)
            };
            commands::match_pattern(&pattern, &path, loose)?
        }
        Commands::Resolve { href } => commands::resolve(&config, &href)?,
        Commands::Replay { start, steps } => commands::replay(&config, &start, &steps)?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
