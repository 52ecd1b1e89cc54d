//! Metric descriptions and CLI-side counters.
//!
//! The libraries emit through the `metrics` facade; no exporter is
//! installed, so values go nowhere unless an embedding application adds one.

use metrics::{counter, histogram};
use tracing::debug;

/// Metric names.
pub mod names {
    pub const PATTERN_COMPILATIONS_TOTAL: &str = "waypoint_pattern_compilations_total";
    pub const LOCATION_COMMITS_TOTAL: &str = "waypoint_location_commits_total";
    pub const COMMANDS_TOTAL: &str = "waypoint_cli_commands_total";
    pub const NOTIFICATIONS_PER_STEP: &str = "waypoint_cli_notifications_per_step";
}

/// Describe the metrics emitted by the workspace.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::PATTERN_COMPILATIONS_TOTAL,
        "Route patterns compiled (cache misses)"
    );
    metrics::describe_counter!(
        names::LOCATION_COMMITS_TOTAL,
        "Locations committed to a store, by kind"
    );
    metrics::describe_counter!(names::COMMANDS_TOTAL, "CLI commands run, by name");
    metrics::describe_histogram!(
        names::NOTIFICATIONS_PER_STEP,
        "Observer notifications delivered per replayed step"
    );

    debug!("Metrics described");
}

/// Record a command invocation.
pub fn record_command(name: &'static str) {
    counter!(names::COMMANDS_TOTAL, "command" => name).increment(1);
}

/// Record how many notifications one replay step produced.
pub fn record_step_notifications(count: usize) {
    histogram!(names::NOTIFICATIONS_PER_STEP).record(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder() {
        init_metrics();
        record_command("match");
        record_step_notifications(3);
    }
}
