//! Graph builder: the ingestion cycle
//!
//! [`GraphBuilder`] owns the committed graph and the measurements waiting for the next
//! batch. Each call to [`GraphBuilder::process_batch`] drains the waiting measurements,
//! selects the best candidate, commits it and carries its leftovers forward.
//!
//! ```
//! use fusion_graph::builder::{BatchOutcome, GraphBuilder};
//! use fusion_graph::config::CandidateConfig;
//! use fusion_graph::measurement::{GpsMeasurement, MeasurementId};
//! use nalgebra::Vector3;
//!
//! let mut builder = GraphBuilder::new(CandidateConfig::new());
//! builder
//!     .add_measurement(GpsMeasurement::new(MeasurementId(1), 10, Vector3::zeros()).into())
//!     .unwrap();
//! let outcome = builder.process_batch().unwrap();
//! assert!(matches!(outcome, BatchOutcome::Committed(_)));
//! assert_eq!(builder.graph().num_edges(), 1);
//! ```

use std::fmt;

use tracing::{info, info_span, warn};

use crate::candidates::{OptimalCandidateFactory, commit};
use crate::config::CandidateConfig;
use crate::error::FusionResult;
use crate::graph::{Graph, GraphStatistics};
use crate::measurement::{Measurement, MeasurementStorage};
use crate::metrics::CandidateScore;

/// Summary of one committed batch.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Running batch number, starting at 0
    pub batch: usize,
    pub num_measurements: usize,
    pub num_candidates: usize,
    pub dropped: usize,
    pub score: CandidateScore,
    pub new_edges: usize,
    pub new_vertices: usize,
    pub skipped: usize,
    /// Samples carried to the next batch
    pub leftovers: usize,
    /// Measurements held back by the group limit
    pub deferred: usize,
    pub graph: GraphStatistics,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Batch {} ===", self.batch)?;
        writeln!(
            f,
            "Measurements: {} ({} deferred)",
            self.num_measurements, self.deferred
        )?;
        writeln!(
            f,
            "Candidates: {} ({} dropped)",
            self.num_candidates, self.dropped
        )?;
        writeln!(f, "Selected: {}", self.score)?;
        writeln!(
            f,
            "Added: {} edges, {} vertices ({} skipped, {} leftovers)",
            self.new_edges, self.new_vertices, self.skipped, self.leftovers
        )?;
        write!(f, "{}", self.graph)
    }
}

#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Committed(BatchSummary),
    /// The batch did not have enough content; its measurements are kept for the next call
    Waiting,
}

#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    graph: Graph,
    storage: MeasurementStorage,
    factory: OptimalCandidateFactory,
    batches: usize,
}

impl GraphBuilder {
    pub fn new(config: CandidateConfig) -> Self {
        Self::with_factory(OptimalCandidateFactory::new(config))
    }

    pub fn with_factory(factory: OptimalCandidateFactory) -> Self {
        Self {
            graph: Graph::new(),
            storage: MeasurementStorage::new(),
            factory,
            batches: 0,
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Measurements waiting for the next batch.
    pub fn storage(&self) -> &MeasurementStorage {
        &self.storage
    }

    /// Number of committed batches.
    pub fn num_batches(&self) -> usize {
        self.batches
    }

    pub fn add_measurement(&mut self, measurement: Measurement) -> FusionResult<()> {
        self.storage.add(measurement)
    }

    pub fn add_measurements<I>(&mut self, measurements: I) -> FusionResult<()>
    where
        I: IntoIterator<Item = Measurement>,
    {
        self.storage.extend(measurements)
    }

    /// Turn the waiting measurements into the next piece of the graph.
    ///
    /// # Errors
    /// Any error other than starvation is returned after the drained measurements are put
    /// back into storage. Under mutate-and-undo a failed undo may leave the graph modified.
    pub fn process_batch(&mut self) -> FusionResult<BatchOutcome> {
        let _span = info_span!("batch", index = self.batches).entered();
        let measurements = self.storage.drain();
        let num_measurements = measurements.len();

        let mut selection = match self.factory.select(&mut self.graph, measurements.clone()) {
            Ok(selection) => selection,
            Err(e) if e.is_starvation() => {
                info!("Waiting for more measurements: {}", e);
                self.storage.extend(measurements)?;
                return Ok(BatchOutcome::Waiting);
            }
            Err(e) => {
                warn!("Batch {} failed: {}", self.batches, e);
                self.storage.extend(measurements)?;
                return Err(e);
            }
        };

        let new_edges = commit(&mut self.graph, &mut selection.best)?;
        let best = &selection.best;
        self.storage.extend(
            best.candidate
                .leftovers
                .iter()
                .copied()
                .map(Measurement::from),
        )?;
        let summary = BatchSummary {
            batch: self.batches,
            num_measurements,
            num_candidates: selection.num_candidates,
            dropped: selection.dropped,
            score: best.score,
            new_edges: new_edges.len(),
            new_vertices: best.candidate.new_vertices.len(),
            skipped: best.candidate.skipped,
            leftovers: best.candidate.leftovers.len(),
            deferred: selection.deferred.len(),
            graph: self.graph.statistics(),
        };
        self.storage.extend(selection.deferred)?;
        self.batches += 1;

        info!("\n{}", summary);
        Ok(BatchOutcome::Committed(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolationStrategy;
    use crate::measurement::{GpsMeasurement, ImuSample, MeasurementId, OdometryMeasurement, TimeRange};
    use nalgebra::{Isometry3, Vector3};

    fn gps(id: u64, timestamp: i64) -> Measurement {
        GpsMeasurement::new(MeasurementId(id), timestamp, Vector3::new(timestamp as f64, 0.0, 0.0)).into()
    }

    fn imu(id: u64, timestamp: i64) -> Measurement {
        ImuSample::new(MeasurementId(id), timestamp, Vector3::zeros(), Vector3::new(0.0, 0.0, 9.81)).into()
    }

    #[test]
    fn test_empty_storage_waits() -> Result<(), Box<dyn std::error::Error>> {
        let mut builder = GraphBuilder::default();
        assert!(matches!(builder.process_batch()?, BatchOutcome::Waiting));
        assert!(builder.graph().is_empty());
        assert_eq!(builder.num_batches(), 0);
        Ok(())
    }

    #[test]
    fn test_starvation_restores_measurements() -> Result<(), Box<dyn std::error::Error>> {
        let mut builder = GraphBuilder::new(CandidateConfig::new().with_require_odometry(true));
        builder.add_measurements([gps(1, 1), gps(2, 2)])?;

        assert!(matches!(builder.process_batch()?, BatchOutcome::Waiting));
        assert_eq!(builder.storage().len(), 2);
        assert!(builder.graph().is_empty());
        Ok(())
    }

    #[test]
    fn test_commit_and_carry_leftovers() -> Result<(), Box<dyn std::error::Error>> {
        let mut builder = GraphBuilder::new(CandidateConfig::new().with_parallel(false));
        builder.add_measurements([gps(1, 10), imu(2, 10), imu(3, 12)])?;

        let BatchOutcome::Committed(summary) = builder.process_batch()? else {
            panic!("Expected a committed batch");
        };

        assert_eq!(summary.batch, 0);
        assert_eq!(summary.num_measurements, 3);
        assert_eq!(summary.leftovers, 2);
        assert_eq!(builder.storage().len(), 2);
        assert_eq!(builder.graph().num_edges(), 1);
        assert_eq!(builder.num_batches(), 1);
        Ok(())
    }

    #[test]
    fn test_isolation_strategies_build_same_graph() -> Result<(), Box<dyn std::error::Error>> {
        let mut stats = Vec::new();
        for isolation in [IsolationStrategy::CopyPerCandidate, IsolationStrategy::MutateAndUndo] {
            let mut builder = GraphBuilder::new(CandidateConfig::new().with_isolation(isolation));
            builder.add_measurements([gps(1, 1), gps(2, 2), gps(3, 3)])?;
            builder.process_batch()?;
            let odometry =
                OdometryMeasurement::new(MeasurementId(4), TimeRange::new(3, 5)?, Isometry3::translation(2.0, 0.0, 0.0))?;
            builder.add_measurements([odometry.into(), gps(5, 5)])?;
            builder.process_batch()?;
            builder.graph().check_consistency()?;
            stats.push(builder.graph().statistics());
        }
        assert_eq!(stats[0].num_poses, 2);
        assert_eq!(stats[0].num_edges, 5);
        assert_eq!(stats[0].num_vertices, stats[1].num_vertices);
        assert_eq!(stats[0].num_edges, stats[1].num_edges);
        assert_eq!(stats[0].num_clusters, stats[1].num_clusters);
        Ok(())
    }
}
