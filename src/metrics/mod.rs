//! Candidate metrics and scores
//!
//! Metrics turn a materialized candidate into score components. The candidate factory
//! combines them with the solver residual into a [`CandidateScore`]; selection compares
//! scores with [`CandidateScore::compare`].

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::candidates::GraphCandidate;
use crate::error::FusionResult;
use crate::graph::{Graph, VertexId};
use crate::measurement::{MeasurementCluster, Timestamp};

pub mod connectivity;

pub use connectivity::{UnionFind, check_connectivity};

/// Structural score components of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsReport {
    /// New vertices are reachable from the old graph through new edges
    pub connected: bool,
    /// Total distance of core timestamps from their cluster timestamps
    pub time_shift: Timestamp,
}

pub trait Metrics: fmt::Debug + Send + Sync {
    /// Score `candidate`, materialized in `graph`.
    fn evaluate(&self, graph: &Graph, candidate: &GraphCandidate) -> FusionResult<MetricsReport>;
}

/// Σ |core timestamp − cluster timestamp| over every cluster with core content.
pub fn time_shift(clusters: &[MeasurementCluster]) -> FusionResult<Timestamp> {
    let mut total = 0;
    for cluster in clusters.iter().filter(|c| c.has_core()) {
        let timestamp = cluster.timestamp()?;
        total += cluster
            .core()
            .iter()
            .map(|m| (m.timestamp() - timestamp).abs())
            .sum::<Timestamp>();
    }
    Ok(total)
}

/// Connectivity over the candidate's edges plus the time shift of its clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateMetrics;

impl Metrics for CandidateMetrics {
    fn evaluate(&self, graph: &Graph, candidate: &GraphCandidate) -> FusionResult<MetricsReport> {
        let old_vertices: BTreeSet<VertexId> = graph
            .vertex_storage()
            .vertices()
            .map(|v| v.id)
            .filter(|id| !candidate.new_vertices.contains(id))
            .collect();
        let connected = check_connectivity(
            candidate.elements.iter().map(|e| e.edge.vertices()),
            &old_vertices,
            &candidate.new_vertices,
        );
        Ok(MetricsReport {
            connected,
            time_shift: time_shift(&candidate.clusters)?,
        })
    }
}

/// Combined score; lower is better once connected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub connected: bool,
    pub residual: f64,
    pub time_shift: Timestamp,
    pub num_leftovers: usize,
    /// Position of the candidate in enumeration order
    pub order: usize,
}

impl CandidateScore {
    /// Connected before disconnected, then the lexicographic minimum of
    /// `(residual, time_shift, num_leftovers, order)`.
    pub fn compare(&self, other: &Self) -> Ordering {
        other
            .connected
            .cmp(&self.connected)
            .then_with(|| self.residual.total_cmp(&other.residual))
            .then_with(|| self.time_shift.cmp(&other.time_shift))
            .then_with(|| self.num_leftovers.cmp(&other.num_leftovers))
            .then_with(|| self.order.cmp(&other.order))
    }
}

impl fmt::Display for CandidateScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} connected={} residual={:.6e} time_shift={} leftovers={}",
            self.order, self.connected, self.residual, self.time_shift, self.num_leftovers
        )
    }
}
