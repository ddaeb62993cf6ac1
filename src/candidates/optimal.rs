//! Selection of the best candidate and commit into the committed graph.
//!
//! Only connected candidates are eligible. Among them the winner is the minimum of
//! `(residual, time_shift, num_leftovers, order)`, see [`CandidateScore::compare`].
//!
//! [`CandidateScore::compare`]: crate::metrics::CandidateScore::compare

use std::fmt;

use tracing::{debug, info};

use crate::candidates::factory::{CandidateFactory, ScoredCandidate};
use crate::config::CandidateConfig;
use crate::error::{FusionError, FusionResult};
use crate::graph::{EdgeIndex, Graph};
use crate::measurement::Measurement;

/// Pick the best connected candidate.
///
/// # Errors
/// Returns [`FusionError::NoCandidate`] if no candidate is connected.
pub fn select_best(candidates: Vec<ScoredCandidate>) -> FusionResult<ScoredCandidate> {
    let total = candidates.len();
    candidates
        .into_iter()
        .filter(|c| c.score.connected)
        .min_by(|a, b| a.score.compare(&b.score))
        .ok_or_else(|| {
            FusionError::NoCandidate(format!("none of {total} candidates is connected"))
        })
}

/// Make `best` part of the committed graph.
///
/// A candidate built on a copy replaces the graph wholesale. A candidate built with
/// mutate-and-undo has its elements re-applied in order and then receives the solver
/// values. The undo released every trial index, so the re-applied edges get the indices
/// they had while the candidate was scored. Returns the indices of the committed edges.
pub fn commit(graph: &mut Graph, best: &mut ScoredCandidate) -> FusionResult<Vec<EdgeIndex>> {
    if let Some(copy) = best.candidate.graph.take() {
        *graph = copy;
        return Ok(best.candidate.new_edges.clone());
    }

    let mut indices = Vec::with_capacity(best.candidate.elements.len());
    for element in &best.candidate.elements {
        indices.push(graph.add_element(element.clone())?);
    }
    graph.update_vertices(best.solution.values.iter().cloned())?;
    best.candidate.new_edges = indices.clone();
    Ok(indices)
}

/// Outcome of one selection round.
#[derive(Debug, Clone)]
pub struct CandidateSelection {
    pub best: ScoredCandidate,
    /// Measurements held back by the group limit
    pub deferred: Vec<Measurement>,
    pub num_candidates: usize,
    pub dropped: usize,
}

impl fmt::Display for CandidateSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "best {} of {} candidates ({} dropped)",
            self.best.score, self.num_candidates, self.dropped
        )
    }
}

/// Candidate factory followed by best-candidate selection.
#[derive(Debug, Clone, Default)]
pub struct OptimalCandidateFactory {
    factory: CandidateFactory,
}

impl OptimalCandidateFactory {
    pub fn new(config: CandidateConfig) -> Self {
        Self::from_factory(CandidateFactory::new(config))
    }

    pub fn from_factory(factory: CandidateFactory) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &CandidateFactory {
        &self.factory
    }

    /// Build every candidate for `measurements` and select the best one.
    ///
    /// The committed graph is left as it was; use [`commit`] to apply the selection.
    pub fn select(&self, graph: &mut Graph, measurements: Vec<Measurement>) -> FusionResult<CandidateSelection> {
        let set = self.factory.build(graph, measurements)?;
        debug!("{}", set);
        let num_candidates = set.candidates.len();
        let best = select_best(set.candidates)?;
        let selection = CandidateSelection {
            best,
            deferred: set.deferred,
            num_candidates,
            dropped: set.dropped,
        };
        info!("Selected {}", selection);
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::factory::GraphCandidate;
    use crate::candidates::leftovers::ClustersWithLeftovers;
    use crate::config::IsolationStrategy;
    use crate::measurement::{GpsMeasurement, MeasurementId, OdometryMeasurement, TimeRange};
    use crate::metrics::{CandidateScore, MetricsReport};
    use crate::solver::SolverOutput;
    use nalgebra::{Isometry3, Vector3};

    fn scored(connected: bool, residual: f64, order: usize) -> ScoredCandidate {
        ScoredCandidate {
            candidate: GraphCandidate::new(ClustersWithLeftovers::new(Vec::new(), Vec::new())),
            solution: SolverOutput {
                values: Vec::new(),
                residual,
            },
            metrics: MetricsReport {
                connected,
                time_shift: 0,
            },
            score: CandidateScore {
                connected,
                residual,
                time_shift: 0,
                num_leftovers: 0,
                order,
            },
        }
    }

    fn batch() -> Result<Vec<Measurement>, Box<dyn std::error::Error>> {
        let odometry = OdometryMeasurement::new(
            MeasurementId(3),
            TimeRange::new(1, 2)?,
            Isometry3::translation(1.0, 0.0, 0.0),
        )?;
        Ok(vec![
            GpsMeasurement::new(MeasurementId(1), 1, Vector3::new(1.0, 0.0, 0.0)).into(),
            GpsMeasurement::new(MeasurementId(2), 2, Vector3::new(2.0, 0.0, 0.0)).into(),
            odometry.into(),
        ])
    }

    #[test]
    fn test_select_best_skips_disconnected() -> Result<(), Box<dyn std::error::Error>> {
        let best = select_best(vec![scored(false, 0.0, 0), scored(true, 3.0, 1), scored(true, 2.0, 2)])?;
        assert_eq!(best.score.order, 2);
        Ok(())
    }

    #[test]
    fn test_select_best_tie_goes_to_first() -> Result<(), Box<dyn std::error::Error>> {
        let best = select_best(vec![scored(true, 1.0, 4), scored(true, 1.0, 1), scored(true, 1.0, 7)])?;
        assert_eq!(best.score.order, 1);
        Ok(())
    }

    #[test]
    fn test_select_best_without_connected_candidate() {
        let result = select_best(vec![scored(false, 0.0, 0)]);
        assert!(matches!(result, Err(FusionError::NoCandidate(_))));
        assert!(matches!(select_best(Vec::new()), Err(FusionError::NoCandidate(_))));
    }

    #[test]
    fn test_commit_matches_across_isolation() -> Result<(), Box<dyn std::error::Error>> {
        let mut stats = Vec::new();
        for isolation in [IsolationStrategy::CopyPerCandidate, IsolationStrategy::MutateAndUndo] {
            let factory = OptimalCandidateFactory::new(CandidateConfig::new().with_isolation(isolation));
            let mut graph = Graph::new();
            let mut selection = factory.select(&mut graph, batch()?)?;
            assert!(graph.is_empty());

            let committed = commit(&mut graph, &mut selection.best)?;
            assert_eq!(committed.len(), 3);
            graph.check_consistency()?;
            stats.push(graph.statistics());
        }
        assert_eq!(stats[0].num_vertices, stats[1].num_vertices);
        assert_eq!(stats[0].num_edges, stats[1].num_edges);
        assert_eq!(stats[0].num_clusters, stats[1].num_clusters);
        assert_eq!(stats[0].next_edge_index, stats[1].next_edge_index);
        Ok(())
    }

    #[test]
    fn test_mutate_and_undo_commit_reuses_trial_indices() -> Result<(), Box<dyn std::error::Error>> {
        let config = CandidateConfig::new().with_isolation(IsolationStrategy::MutateAndUndo);
        let factory = OptimalCandidateFactory::new(config);
        let mut graph = Graph::new();
        let mut selection = factory.select(&mut graph, batch()?)?;
        let undone = selection.best.candidate.new_edges.clone();
        assert_eq!(graph.next_edge_index(), EdgeIndex(0));

        let committed = commit(&mut graph, &mut selection.best)?;

        assert_eq!(committed, undone);
        assert_eq!(committed, vec![EdgeIndex(0), EdgeIndex(1), EdgeIndex(2)]);
        assert!(committed.iter().all(|&index| graph.edge(index).is_some()));
        assert_eq!(graph.next_edge_index(), EdgeIndex(3));
        Ok(())
    }
}
