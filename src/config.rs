//! Configuration for candidate construction
//!
//! [`CandidateConfig`] follows the builder pattern: start from [`CandidateConfig::default`]
//! and chain `with_*` calls.
//!
//! ```
//! use fusion_graph::config::{CandidateConfig, IsolationStrategy};
//!
//! let config = CandidateConfig::new()
//!     .with_isolation(IsolationStrategy::MutateAndUndo)
//!     .with_max_groups(8);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{FusionError, FusionResult};
use crate::measurement::Timestamp;

/// How candidates are kept apart from the committed graph while they are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationStrategy {
    /// Deep-copy the committed graph for every candidate. Safe for parallel evaluation.
    #[default]
    CopyPerCandidate,
    /// Build on the live graph and remove the added edges after scoring. Sequential only.
    MutateAndUndo,
}

/// Configuration for the candidate factory.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateConfig {
    pub isolation: IsolationStrategy,
    /// Evaluate candidates on the rayon pool. Ignored under mutate-and-undo.
    pub parallel: bool,
    /// Upper bound on timestamp groups per batch, caps the 2^(N-1) enumeration.
    pub max_groups: usize,
    /// Minimum number of core measurements in a batch.
    pub min_core_measurements: usize,
    /// Require at least one odometry measurement per batch.
    pub require_odometry: bool,
    /// Time threshold for nearest-vertex lookups in the committed graph.
    pub vertex_search_threshold: Timestamp,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            isolation: IsolationStrategy::CopyPerCandidate,
            parallel: true,
            max_groups: 12,
            min_core_measurements: 1,
            require_odometry: false,
            vertex_search_threshold: 0,
        }
    }
}

impl CandidateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation(mut self, isolation: IsolationStrategy) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_groups(mut self, max_groups: usize) -> Self {
        self.max_groups = max_groups;
        self
    }

    pub fn with_min_core_measurements(mut self, min_core_measurements: usize) -> Self {
        self.min_core_measurements = min_core_measurements;
        self
    }

    pub fn with_require_odometry(mut self, require_odometry: bool) -> Self {
        self.require_odometry = require_odometry;
        self
    }

    pub fn with_vertex_search_threshold(mut self, threshold: Timestamp) -> Self {
        self.vertex_search_threshold = threshold;
        self
    }

    /// Whether candidates actually run in parallel with this configuration.
    pub fn runs_parallel(&self) -> bool {
        self.parallel && self.isolation == IsolationStrategy::CopyPerCandidate
    }

    /// Check the configuration for settings the pipeline cannot honour.
    pub fn validate(&self) -> FusionResult<()> {
        if self.max_groups == 0 {
            return Err(FusionError::InvalidInput(
                "max_groups must be at least 1".to_string(),
            ));
        }
        if self.max_groups >= 64 {
            return Err(FusionError::InvalidInput(format!(
                "max_groups {} does not fit the cut-point mask",
                self.max_groups
            )));
        }
        if self.vertex_search_threshold < 0 {
            return Err(FusionError::InvalidInput(format!(
                "vertex_search_threshold must be non-negative, got {}",
                self.vertex_search_threshold
            )));
        }
        Ok(())
    }
}
