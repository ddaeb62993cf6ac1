//! Edge factories: turning measurements into graph elements
//!
//! A factory receives the graph as it stands (including the elements already applied for
//! the current candidate), the candidate-local cluster table and one measurement, and
//! returns the elements to apply. A measurement that cannot form an edge yet returns
//! [`FusionError::Skip`](crate::error::FusionError::Skip).
//!
//! # Module Structure
//!
//! - `clusters`: candidate-local vertex cluster table and vertex resolution
//! - `pose_factory`: absolute pose priors and GPS fixes
//! - `odometry_factory`: relative motion between two poses, whole or split
//! - `imu_factory`: inertial pre-integration between two states

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::FusionResult;
use crate::graph::{Graph, GraphElement};
use crate::measurement::{Measurement, MeasurementKind};
use crate::skip_measurement;

pub mod clusters;
pub mod imu_factory;
pub mod odometry_factory;
pub mod pose_factory;

pub use clusters::{CandidateClusters, value_of};
pub use imu_factory::ImuEdgeFactory;
pub use odometry_factory::{OdometryEdgeFactory, SplitOdometryEdgeFactory};
pub use pose_factory::{GpsEdgeFactory, PoseEdgeFactory};

/// Creates graph elements for one kind of measurement.
pub trait EdgeFactory: fmt::Debug + Send + Sync {
    fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>>;
}

/// Type-dispatched table of edge factories.
#[derive(Debug, Clone, Default)]
pub struct EdgeFactoryRegistry {
    factories: BTreeMap<MeasurementKind, Arc<dyn EdgeFactory>>,
}

impl EdgeFactoryRegistry {
    /// Empty registry. Every measurement is skipped until a factory is registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in factories.
    ///
    /// Raw IMU samples and fake measurements have no factory.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_factory(MeasurementKind::Pose, Arc::new(PoseEdgeFactory))
            .with_factory(MeasurementKind::Gps, Arc::new(GpsEdgeFactory))
            .with_factory(MeasurementKind::Odometry, Arc::new(OdometryEdgeFactory))
            .with_factory(MeasurementKind::SplitOdometry, Arc::new(SplitOdometryEdgeFactory))
            .with_factory(MeasurementKind::Continuous, Arc::new(ImuEdgeFactory::default()))
    }

    pub fn with_factory(mut self, kind: MeasurementKind, factory: Arc<dyn EdgeFactory>) -> Self {
        self.register(kind, factory);
        self
    }

    /// Register a factory, returning the one it replaces.
    pub fn register(
        &mut self,
        kind: MeasurementKind,
        factory: Arc<dyn EdgeFactory>,
    ) -> Option<Arc<dyn EdgeFactory>> {
        self.factories.insert(kind, factory)
    }

    pub fn get(&self, kind: MeasurementKind) -> Option<&Arc<dyn EdgeFactory>> {
        self.factories.get(&kind)
    }

    /// Dispatch `measurement` to its factory.
    ///
    /// # Errors
    /// Returns a skip if no factory is registered for the measurement kind, and whatever
    /// the factory returns otherwise.
    pub fn create(
        &self,
        graph: &Graph,
        clusters: &mut CandidateClusters,
        measurement: &Measurement,
    ) -> FusionResult<Vec<GraphElement>> {
        let factory = self
            .get(measurement.kind())
            .ok_or_else(|| skip_measurement!("No edge factory for {} measurements", measurement.kind()))?;
        factory.create(graph, clusters, measurement)
    }
}
