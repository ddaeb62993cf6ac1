pub mod builder;
pub mod candidates;
pub mod config;
pub mod edge_factories;
pub mod error;
pub mod factors;
pub mod graph;
pub mod logger;
pub mod measurement;
pub mod metrics;
pub mod solver;

pub use builder::{BatchOutcome, BatchSummary, GraphBuilder};
pub use config::{CandidateConfig, IsolationStrategy};
pub use error::{FusionError, FusionResult};
pub use logger::{init_logger, init_logger_with_level, init_logger_with_levels};
