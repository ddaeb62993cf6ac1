//! Factories for absolute observations: pose priors and GPS fixes.

use std::sync::Arc;

use nalgebra::{Isometry3, Translation3, UnitQuaternion};

use super::{CandidateClusters, EdgeFactory};
use crate::error::{FusionError, FusionResult};
use crate::factors::{GpsFactor, PosePriorFactor};
use crate::graph::{Edge, EdgeKind, Graph, GraphElement, VertexKind, VertexValue};
use crate::measurement::Measurement;

/// Prior edge on the pose at the measurement timestamp. A new pose starts at the
/// measured value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseEdgeFactory;

impl EdgeFactory for PoseEdgeFactory {
    fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>> {
        let Measurement::Pose(pose) = measurement else {
            return Err(FusionError::InvalidInput(format!(
                "PoseEdgeFactory cannot handle {measurement}"
            )));
        };
        let mut pending = Vec::new();
        let vertex = clusters.resolve(graph, &mut pending, VertexKind::Pose, pose.timestamp, || {
            VertexValue::Pose(pose.pose)
        });
        let factor = PosePriorFactor::new(pose.pose).with_information(pose.information);
        let edge = Edge::new(
            EdgeKind::Prior,
            vec![(vertex, pose.timestamp)],
            Arc::new(factor),
            measurement.key(),
        );
        Ok(vec![GraphElement::new(edge, pending)])
    }
}

/// Position edge on the pose at the fix timestamp. A new pose starts at the fix with the
/// orientation of the latest pose.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpsEdgeFactory;

impl EdgeFactory for GpsEdgeFactory {
    fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>> {
        let Measurement::Gps(gps) = measurement else {
            return Err(FusionError::InvalidInput(format!(
                "GpsEdgeFactory cannot handle {measurement}"
            )));
        };
        let orientation = graph
            .vertex_storage()
            .last_vertex(VertexKind::Pose)
            .and_then(|v| graph.vertex(&v))
            .and_then(|v| v.value.as_pose().map(|p| p.rotation))
            .unwrap_or_else(UnitQuaternion::identity);

        let mut pending = Vec::new();
        let vertex = clusters.resolve(graph, &mut pending, VertexKind::Pose, gps.timestamp, || {
            VertexValue::Pose(Isometry3::from_parts(Translation3::from(gps.position), orientation))
        });
        let factor = GpsFactor::new(gps.position).with_information(gps.information);
        let edge = Edge::new(
            EdgeKind::Gps,
            vec![(vertex, gps.timestamp)],
            Arc::new(factor),
            measurement.key(),
        );
        Ok(vec![GraphElement::new(edge, pending)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{GpsMeasurement, MeasurementCluster, MeasurementId, PoseMeasurement};
    use nalgebra::Vector3;

    #[test]
    fn test_pose_prior_starts_at_measurement() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let measured = Isometry3::translation(1.0, 2.0, 0.0);
        let pose: Measurement = PoseMeasurement::new(MeasurementId(1), 3, measured).into();
        let cluster = MeasurementCluster::from_measurements([pose.clone()])?;
        let mut clusters = CandidateClusters::new(&graph, &[cluster], 0)?;

        let elements = PoseEdgeFactory.create(&graph, &mut clusters, &pose)?;
        let element = &elements[0];

        assert_eq!(element.edge.kind(), EdgeKind::Prior);
        assert_eq!(element.new_vertices[0].vertex.value, VertexValue::Pose(measured));
        let values: Vec<&VertexValue> = vec![&element.new_vertices[0].vertex.value];
        assert!(element.edge.factor().weighted_error(&values)? < 1e-12);
        Ok(())
    }

    #[test]
    fn test_gps_shares_pose_with_prior_in_same_cluster() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        let pose: Measurement =
            PoseMeasurement::new(MeasurementId(1), 3, Isometry3::identity()).into();
        let gps: Measurement = GpsMeasurement::new(MeasurementId(2), 4, Vector3::zeros()).into();
        let cluster = MeasurementCluster::from_measurements([pose.clone(), gps.clone()])?;
        let mut clusters = CandidateClusters::new(&graph, &[cluster], 0)?;

        for element in PoseEdgeFactory.create(&graph, &mut clusters, &pose)? {
            graph.add_element(element)?;
        }
        let elements = GpsEdgeFactory.create(&graph, &mut clusters, &gps)?;

        assert!(elements[0].new_vertices.is_empty());
        assert_eq!(elements[0].edge.vertices(), graph.edges().next().map(|e| e.vertices()).unwrap_or_default());
        Ok(())
    }

    #[test]
    fn test_wrong_measurement_is_rejected() {
        let graph = Graph::new();
        let gps: Measurement = GpsMeasurement::new(MeasurementId(2), 4, Vector3::zeros()).into();
        let result = CandidateClusters::new(&graph, &[], 0)
            .and_then(|mut clusters| PoseEdgeFactory.create(&graph, &mut clusters, &gps));
        assert!(matches!(result, Err(FusionError::InvalidInput(_))));
    }
}
