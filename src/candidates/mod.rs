//! Candidate construction pipeline
//!
//! A batch of measurements becomes a set of graph candidates in stages:
//! separate, group, enumerate cluster combinations, filter loops, fill connections
//! with the continuous stream, deduplicate, materialize, evaluate and select.
//!
//! # Module Structure
//!
//! - `combinations`: timestamp groups and their contiguous partitions
//! - `loops`: rejection of clusters holding both halves of one split odometry
//! - `connections`: forward chains bridging consecutive clusters
//! - `leftovers`: slicing the continuous stream into connections
//! - `dedup`: value-based removal of duplicate variants
//! - `variants`: the enumeration stages end to end
//! - `isolation`: copy-per-candidate and mutate-and-undo workspaces
//! - `factory`: materialization and scoring
//! - `optimal`: selection and commit

pub mod combinations;
pub mod connections;
pub mod dedup;
pub mod factory;
pub mod isolation;
pub mod leftovers;
pub mod loops;
pub mod optimal;
pub mod variants;

pub use combinations::{Combination, CombinationFactory, MeasurementGroup, group_by_timestamp};
pub use connections::{CandidateTopology, Connection, ConnectionFactory};
pub use dedup::remove_duplicates;
pub use factory::{CandidateFactory, CandidateSet, GraphCandidate, ScoredCandidate};
pub use isolation::{CopiedGraph, GraphIsolation, LiveGraph};
pub use leftovers::{ClustersWithLeftovers, fill_connections, fill_single_cluster, get_subsequence};
pub use loops::{has_loop, remove_loops};
pub use optimal::{CandidateSelection, OptimalCandidateFactory, commit, select_best};
pub use variants::{SeparatedMeasurements, Variants, VariantsFactory, covered_keys};
