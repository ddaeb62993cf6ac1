//! Odometry over an interval and its start/stop projections.
//!
//! An odometry measurement constrains two graph moments at once. To let each endpoint
//! anchor its own cluster, it is split into two [`SplitOdometry`] halves sharing one
//! parent. Only the stop half turns into an edge; the start half marks where the
//! relative motion begins.

use std::sync::Arc;

use nalgebra::{Isometry3, Matrix6};

use crate::error::FusionResult;
use crate::measurement::{MeasurementId, MeasurementKey, TimeRange, Timestamp};
use crate::validation_error;

/// Relative SE(3) motion between `time_range.start` and `time_range.stop`.
#[derive(Debug, Clone, PartialEq)]
pub struct OdometryMeasurement {
    pub id: MeasurementId,
    pub time_range: TimeRange,
    pub relative: Isometry3<f64>,
    pub information: Matrix6<f64>,
}

impl OdometryMeasurement {
    /// # Errors
    /// Returns a validation error for zero-length intervals, which would make both
    /// halves land in one moment.
    pub fn new(
        id: MeasurementId,
        time_range: TimeRange,
        relative: Isometry3<f64>,
    ) -> FusionResult<Self> {
        if time_range.start >= time_range.stop {
            return Err(validation_error!(
                "Odometry {} needs a non-empty interval, got {}",
                id,
                time_range
            ));
        }
        Ok(Self {
            id,
            time_range,
            relative,
            information: Matrix6::identity(),
        })
    }

    pub fn with_information(mut self, information: Matrix6<f64>) -> Self {
        self.information = information;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SplitHalf {
    Start,
    Stop,
}

/// One timestamp projection of an odometry measurement.
#[derive(Debug, Clone)]
pub struct SplitOdometry {
    parent: Arc<OdometryMeasurement>,
    half: SplitHalf,
}

impl SplitOdometry {
    pub fn new(parent: Arc<OdometryMeasurement>, half: SplitHalf) -> Self {
        Self { parent, half }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self.half {
            SplitHalf::Start => self.parent.time_range.start,
            SplitHalf::Stop => self.parent.time_range.stop,
        }
    }

    pub fn parent(&self) -> &Arc<OdometryMeasurement> {
        &self.parent
    }

    pub fn half(&self) -> SplitHalf {
        self.half
    }

    pub fn is_stop(&self) -> bool {
        self.half == SplitHalf::Stop
    }

    pub fn key(&self) -> MeasurementKey {
        MeasurementKey::Split {
            parent: self.parent.id,
            half: self.half,
        }
    }
}

/// Split an odometry measurement into its start and stop halves.
pub fn split(odometry: &Arc<OdometryMeasurement>) -> [SplitOdometry; 2] {
    [
        SplitOdometry::new(Arc::clone(odometry), SplitHalf::Start),
        SplitOdometry::new(Arc::clone(odometry), SplitHalf::Stop),
    ]
}
