//! Factory for inertial edges over continuous measurements.
//!
//! One continuous measurement bridging `[t_i, t_j]` becomes an edge over
//! `[pose_i, velocity_i, pose_j, velocity_j, bias_i]`. Missing states at `t_j` are
//! initialized by propagating the state at `t_i` through the pre-integrated motion, so a
//! fresh edge starts with a zero residual.

use std::sync::Arc;

use nalgebra::{Isometry3, Matrix3, Translation3, Vector3};

use super::odometry_factory::latest_pose;
use super::{CandidateClusters, EdgeFactory, value_of};
use crate::error::{FusionError, FusionResult};
use crate::factors::ImuPreintegrationFactor;
use crate::factors::imu_preintegration_factor::GRAVITY;
use crate::graph::{Edge, EdgeKind, Graph, GraphElement, VertexKind, VertexValue};
use crate::measurement::Measurement;
use crate::skip_measurement;

#[derive(Debug, Clone, PartialEq)]
pub struct ImuEdgeFactory {
    seconds_per_tick: f64,
    information: Matrix3<f64>,
}

impl Default for ImuEdgeFactory {
    /// Nanosecond timestamps, unit information.
    fn default() -> Self {
        Self {
            seconds_per_tick: 1e-9,
            information: Matrix3::identity(),
        }
    }
}

impl ImuEdgeFactory {
    pub fn new(seconds_per_tick: f64) -> Self {
        Self {
            seconds_per_tick,
            ..Self::default()
        }
    }

    pub fn with_information(mut self, information: Matrix3<f64>) -> Self {
        self.information = information;
        self
    }

    pub fn seconds_per_tick(&self) -> f64 {
        self.seconds_per_tick
    }
}

fn latest_value(graph: &Graph, kind: VertexKind) -> VertexValue {
    graph
        .vertex_storage()
        .last_vertex(kind)
        .and_then(|v| graph.vertex(&v))
        .map(|v| v.value.clone())
        .unwrap_or_else(|| VertexValue::identity(kind))
}

impl EdgeFactory for ImuEdgeFactory {
    fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>> {
        let Measurement::Continuous(continuous) = measurement else {
            return Err(FusionError::InvalidInput(format!(
                "ImuEdgeFactory cannot handle {measurement}"
            )));
        };
        let range = continuous.time_range();
        if range.duration() == 0 {
            return Err(skip_measurement!("Inertial segment {} has zero length", range));
        }
        let factor = ImuPreintegrationFactor::new(continuous.items().to_vec(), range, self.seconds_per_tick)?
            .with_information(self.information);

        let mut pending = Vec::new();
        let pose_i = clusters.resolve(graph, &mut pending, VertexKind::Pose, range.start, || {
            VertexValue::Pose(latest_pose(graph))
        });
        let velocity_i = clusters.resolve(graph, &mut pending, VertexKind::Velocity, range.start, || {
            VertexValue::Velocity(Vector3::zeros())
        });
        let bias_i = clusters.resolve(graph, &mut pending, VertexKind::ImuBias, range.start, || {
            latest_value(graph, VertexKind::ImuBias)
        });

        let start_pose = value_of(graph, &pending, pose_i)
            .and_then(|v| v.as_pose().copied())
            .unwrap_or_else(Isometry3::identity);
        let start_velocity = value_of(graph, &pending, velocity_i)
            .and_then(|v| v.as_velocity().copied())
            .unwrap_or_else(Vector3::zeros);
        let (gyroscope_bias, accelerometer_bias) = value_of(graph, &pending, bias_i)
            .and_then(|v| v.as_imu_bias().map(|(g, a)| (*g, *a)))
            .unwrap_or_else(|| (Vector3::zeros(), Vector3::zeros()));

        let motion = factor.preintegrate(&gyroscope_bias, &accelerometer_bias);
        let dt = motion.delta_time;
        let rotation = start_pose.rotation;
        let position = start_pose.translation.vector
            + start_velocity * dt
            + 0.5 * GRAVITY * dt * dt
            + rotation * motion.delta_position;
        let predicted_pose = Isometry3::from_parts(Translation3::from(position), rotation * motion.delta_rotation);
        let predicted_velocity = start_velocity + GRAVITY * dt + rotation * motion.delta_velocity;

        let pose_j = clusters.resolve(graph, &mut pending, VertexKind::Pose, range.stop, || {
            VertexValue::Pose(predicted_pose)
        });
        let velocity_j = clusters.resolve(graph, &mut pending, VertexKind::Velocity, range.stop, || {
            VertexValue::Velocity(predicted_velocity)
        });
        if pose_i == pose_j || velocity_i == velocity_j {
            return Err(skip_measurement!(
                "Inertial segment {} maps both ends onto one state",
                range
            ));
        }

        let edge = Edge::new(
            EdgeKind::ImuOdometry,
            vec![
                (pose_i, range.start),
                (velocity_i, range.start),
                (pose_j, range.stop),
                (velocity_j, range.stop),
                (bias_i, range.start),
            ],
            Arc::new(factor),
            measurement.key(),
        );
        Ok(vec![GraphElement::new(edge, pending)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::VertexId;
    use crate::measurement::{ContinuousMeasurement, ImuSample, MeasurementId, TimeRange};

    fn stationary_segment(start: i64, stop: i64) -> Result<Measurement, Box<dyn std::error::Error>> {
        let samples = (start..stop)
            .map(|t| {
                ImuSample::new(
                    MeasurementId(100 + t as u64),
                    t,
                    Vector3::zeros(),
                    Vector3::new(0.0, 0.0, 9.81),
                )
            })
            .collect();
        Ok(ContinuousMeasurement::new(samples, TimeRange::new(start, stop)?)?.into())
    }

    #[test]
    fn test_fresh_segment_has_zero_residual() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let segment = stationary_segment(0, 10)?;
        let mut clusters = CandidateClusters::new(&graph, &[], 0)?;

        let elements = ImuEdgeFactory::new(0.01).create(&graph, &mut clusters, &segment)?;
        let element = &elements[0];

        assert_eq!(element.edge.kind(), EdgeKind::ImuOdometry);
        assert_eq!(element.new_vertices.len(), 5);
        let values: Vec<&VertexValue> = element
            .edge
            .vertices()
            .iter()
            .filter_map(|id| element.new_vertices.iter().find(|nv| nv.vertex.id == *id))
            .map(|nv| &nv.vertex.value)
            .collect();
        assert!(element.edge.factor().weighted_error(&values)? < 1e-9);
        Ok(())
    }

    #[test]
    fn test_edge_vertex_order() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let segment = stationary_segment(0, 4)?;
        let mut clusters = CandidateClusters::new(&graph, &[], 0)?;

        let elements = ImuEdgeFactory::default().create(&graph, &mut clusters, &segment)?;
        let kinds: Vec<VertexKind> = elements[0].edge.vertices().iter().map(|v| v.kind).collect();

        assert_eq!(
            kinds,
            vec![
                VertexKind::Pose,
                VertexKind::Velocity,
                VertexKind::Pose,
                VertexKind::Velocity,
                VertexKind::ImuBias
            ]
        );
        assert_eq!(elements[0].edge.vertices()[4], VertexId::imu_bias(0));
        assert_eq!(elements[0].edge.timestamps(), &[0, 0, 4, 4, 0]);
        Ok(())
    }

    #[test]
    fn test_wrong_measurement_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let graph = Graph::new();
        let mut clusters = CandidateClusters::new(&graph, &[], 0)?;
        let sample: Measurement =
            ImuSample::new(MeasurementId(1), 1, Vector3::zeros(), Vector3::zeros()).into();

        let result = ImuEdgeFactory::default().create(&graph, &mut clusters, &sample);
        assert!(matches!(result, Err(FusionError::InvalidInput(_))));
        Ok(())
    }
}
