//! Factories for relative motion between two poses.
//!
//! Whole odometry measurements become one between edge. Split odometry only materializes
//! on its stop half; the start half anchors a graph moment and nothing else.

use std::sync::Arc;

use nalgebra::Isometry3;

use super::{CandidateClusters, EdgeFactory, value_of};
use crate::error::{FusionError, FusionResult};
use crate::factors::BetweenFactor;
use crate::graph::{Edge, EdgeKind, Graph, GraphElement, VertexKind, VertexValue};
use crate::measurement::{Measurement, MeasurementKey, OdometryMeasurement};
use crate::skip_measurement;

/// Latest pose value in the graph, or identity for an empty graph.
pub(crate) fn latest_pose(graph: &Graph) -> Isometry3<f64> {
    graph
        .vertex_storage()
        .last_vertex(VertexKind::Pose)
        .and_then(|v| graph.vertex(&v))
        .and_then(|v| v.value.as_pose().copied())
        .unwrap_or_else(Isometry3::identity)
}

fn between_element(
    graph: &Graph,
    clusters: &mut CandidateClusters,
    odometry: &OdometryMeasurement,
    key: MeasurementKey,
) -> FusionResult<GraphElement> {
    let range = odometry.time_range;
    let mut pending = Vec::new();

    let pose_i = clusters.resolve(graph, &mut pending, VertexKind::Pose, range.start, || {
        VertexValue::Pose(latest_pose(graph))
    });
    let start = value_of(graph, &pending, pose_i)
        .and_then(|v| v.as_pose().copied())
        .unwrap_or_else(Isometry3::identity);
    let pose_j = clusters.resolve(graph, &mut pending, VertexKind::Pose, range.stop, || {
        VertexValue::Pose(start * odometry.relative)
    });
    if pose_i == pose_j {
        return Err(skip_measurement!(
            "Odometry {} over {} maps both ends onto {}",
            odometry.id,
            range,
            pose_i
        ));
    }

    let factor = BetweenFactor::new(odometry.relative).with_information(odometry.information);
    let edge = Edge::new(
        EdgeKind::PoseOdometry,
        vec![(pose_i, range.start), (pose_j, range.stop)],
        Arc::new(factor),
        key,
    );
    Ok(GraphElement::new(edge, pending))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OdometryEdgeFactory;

impl EdgeFactory for OdometryEdgeFactory {
    fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>> {
        let Measurement::Odometry(odometry) = measurement else {
            return Err(FusionError::InvalidInput(format!(
                "OdometryEdgeFactory cannot handle {measurement}"
            )));
        };
        Ok(vec![between_element(graph, clusters, odometry, measurement.key())?])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SplitOdometryEdgeFactory;

impl EdgeFactory for SplitOdometryEdgeFactory {
    fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>> {
        let Measurement::SplitOdometry(split) = measurement else {
            return Err(FusionError::InvalidInput(format!(
                "SplitOdometryEdgeFactory cannot handle {measurement}"
            )));
        };
        if !split.is_stop() {
            return Err(skip_measurement!(
                "Start half of odometry {} waits for its stop half",
                split.parent().id
            ));
        }
        Ok(vec![between_element(graph, clusters, split.parent(), measurement.key())?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::odometry::split;
    use crate::measurement::{MeasurementCluster, MeasurementId, TimeRange};

    fn odometry(start: i64, stop: i64) -> Result<Arc<OdometryMeasurement>, Box<dyn std::error::Error>> {
        Ok(Arc::new(OdometryMeasurement::new(
            MeasurementId(7),
            TimeRange::new(start, stop)?,
            Isometry3::translation(1.0, 0.0, 0.0),
        )?))
    }

    #[test]
    fn test_odometry_creates_two_poses() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let measurement = Measurement::Odometry(odometry(1, 2)?);
        let mut clusters = CandidateClusters::new(&graph, &[], 0)?;

        let elements = OdometryEdgeFactory.create(&graph, &mut clusters, &measurement)?;
        let element = &elements[0];

        assert_eq!(element.edge.kind(), EdgeKind::PoseOdometry);
        assert_eq!(element.new_vertices.len(), 2);
        let values: Vec<&VertexValue> = element.new_vertices.iter().map(|nv| &nv.vertex.value).collect();
        assert!(element.edge.factor().weighted_error(&values)? < 1e-12);
        Ok(())
    }

    #[test]
    fn test_start_half_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let [start, stop] = split(&odometry(1, 2)?);
        let mut clusters = CandidateClusters::new(&graph, &[], 0)?;

        let skipped = SplitOdometryEdgeFactory.create(&graph, &mut clusters, &start.into());
        assert!(skipped.is_err_and(|e| e.is_skip()));

        let elements = SplitOdometryEdgeFactory.create(&graph, &mut clusters, &stop.into())?;
        assert_eq!(elements[0].edge.vertices().len(), 2);
        Ok(())
    }

    #[test]
    fn test_both_ends_in_one_cluster_is_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let parent = odometry(1, 2)?;
        let [start, stop] = split(&parent);
        // Built directly; the loop filter would never let this cluster through.
        let cluster = MeasurementCluster::from_measurements([start.into(), stop.clone().into()])?;
        let mut clusters = CandidateClusters::new(&graph, &[cluster], 0)?;

        let result = SplitOdometryEdgeFactory.create(&graph, &mut clusters, &stop.into());
        assert!(result.is_err_and(|e| e.is_skip()));
        Ok(())
    }
}
