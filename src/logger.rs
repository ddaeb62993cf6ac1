//! Logging setup for fusion-graph executables
//!
//! Library code only emits `tracing` events. Every ingestion cycle runs inside a `batch`
//! span, so events from the candidate pipeline carry the batch index. Candidates may be
//! evaluated on rayon workers, which is why thread names are part of the format.
//!
//! The candidate pipeline is chatty at DEBUG (one event per skipped measurement and per
//! discarded branch). [`init_logger_with_levels`] raises or lowers it independently of
//! the rest of the crate.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

/// Targets that make up the candidate pipeline.
pub const PIPELINE_TARGETS: [&str; 2] = ["fusion_graph::candidates", "fusion_graph::edge_factories"];

/// Initialize the tracing subscriber with fusion-graph's standard configuration
///
/// Default log level: INFO (overrideable via RUST_LOG environment variable)
///
/// # Example
/// ```no_run
/// use fusion_graph::init_logger;
///
/// fn main() {
///     init_logger();
///     tracing::info!("Application started");
/// }
/// ```
///
/// # Environment Variables
/// ```bash
/// RUST_LOG=debug cargo run --bin simulate_batches
/// RUST_LOG=fusion_graph::candidates=trace cargo run --bin simulate_batches
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
pub fn init_logger_with_level(default_level: Level) {
    init_logger_with_levels(default_level, None)
}

/// Initialize the tracing subscriber with separate levels for the crate and the pipeline
///
/// # Arguments
/// * `default_level` - The default log level (overrideable via RUST_LOG)
/// * `pipeline_level` - Level for [`PIPELINE_TARGETS`]; takes precedence over RUST_LOG
pub fn init_logger_with_levels(default_level: Level, pipeline_level: Option<Level>) {
    use tracing_subscriber::fmt::time::SystemTime;

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_level, pipeline_level))
        .with_timer(SystemTime)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn build_filter(default_level: Level, pipeline_level: Option<Level>) -> EnvFilter {
    let mut filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    if let Some(level) = pipeline_level {
        let level = level.as_str().to_lowercase();
        for target in PIPELINE_TARGETS {
            match format!("{target}={level}").parse::<Directive>() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(e) => eprintln!("Ignoring log directive for {target}: {e}"),
            }
        }
    }
    filter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_level_adds_directives() {
        let filter = build_filter(Level::INFO, Some(Level::DEBUG)).to_string().to_lowercase();
        for target in PIPELINE_TARGETS {
            assert!(filter.contains(&format!("{target}=debug")), "{filter}");
        }
    }

    #[test]
    fn test_without_pipeline_level_targets_are_untouched() {
        let filter = build_filter(Level::WARN, None).to_string();
        assert!(!filter.contains("fusion_graph::edge_factories"));
    }
}
