//! Error types for the fusion-graph library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! The variants follow the error taxonomy of the candidate pipeline:
//! - [`FusionError::Skip`]: a single measurement cannot form an edge yet (local, non-fatal)
//! - [`FusionError::InfeasibleTopology`]: a branch produced no viable structure
//! - [`FusionError::Validation`]: an invariant was violated (fatal to the operation)
//! - [`FusionError::NotEnoughMeasurements`]: the batch cannot produce a candidate yet

use crate::graph::GraphError;
use thiserror::Error;

/// Main result type used throughout the fusion-graph library
pub type FusionResult<T> = Result<T, FusionError>;

/// Main error type for the fusion-graph library
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusionError {
    /// Invariant violations (duplicate items, inverted ranges, self-connections)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A measurement cannot be turned into an edge yet
    #[error("Skipped measurement: {0}")]
    Skip(String),

    /// No viable cluster structure exists for a branch
    #[error("Infeasible topology: {0}")]
    InfeasibleTopology(String),

    /// The batch does not satisfy the minimum-content policy
    #[error("Not enough measurements: {0}")]
    NotEnoughMeasurements(String),

    /// Graph store errors
    #[error("Graph error: {0}")]
    Graph(String),

    /// Solver backend errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Metrics backend errors
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Invalid input parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No candidate satisfied the selection criteria
    #[error("No candidate: {0}")]
    NoCandidate(String),
}

impl FusionError {
    /// Whether the error only skips the current measurement.
    pub fn is_skip(&self) -> bool {
        matches!(self, FusionError::Skip(_))
    }

    /// Whether the error reports a starving batch.
    pub fn is_starvation(&self) -> bool {
        matches!(self, FusionError::NotEnoughMeasurements(_))
    }
}

impl From<GraphError> for FusionError {
    fn from(err: GraphError) -> Self {
        FusionError::Graph(err.to_string())
    }
}

/// Convenience macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($msg:expr) => {
        $crate::error::FusionError::Validation($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::FusionError::Validation(format!($fmt, $($arg)*))
    };
}

/// Convenience macro for creating measurement skip signals
#[macro_export]
macro_rules! skip_measurement {
    ($msg:expr) => {
        $crate::error::FusionError::Skip($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::FusionError::Skip(format!($fmt, $($arg)*))
    };
}
