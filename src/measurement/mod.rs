//! Measurement model for the candidate pipeline
//!
//! A [`Measurement`] is a closed tagged union over everything the pipeline can place into a
//! graph moment:
//! - sensor measurements produced upstream (`Pose`, `Gps`, `Odometry`, `Imu`)
//! - structural measurements produced by the pipeline itself (`SplitOdometry`, `Continuous`,
//!   `Fake`)
//!
//! Measurements are immutable once created. Large payloads are shared through [`Arc`] so
//! that clusters can be copied freely while enumerating combinations.

use std::fmt;
use std::sync::Arc;

use nalgebra::{Isometry3, Matrix3, Matrix6, Vector3};

use crate::error::FusionResult;
use crate::validation_error;

pub mod cluster;
pub mod continuous;
pub mod odometry;
pub mod storage;

pub use cluster::MeasurementCluster;
pub use continuous::{ContinuousMeasurement, ImuSample};
pub use odometry::{OdometryMeasurement, SplitHalf, SplitOdometry};
pub use storage::MeasurementStorage;

/// Timestamp in integer ticks (nanoseconds for real datasets).
pub type Timestamp = i64;

/// Closed time interval `[start, stop]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeRange {
    pub start: Timestamp,
    pub stop: Timestamp,
}

impl TimeRange {
    /// Create a new time range.
    ///
    /// # Errors
    /// Returns a validation error if `start > stop`.
    pub fn new(start: Timestamp, stop: Timestamp) -> FusionResult<Self> {
        if start > stop {
            return Err(validation_error!(
                "Time range start {} is after stop {}",
                start,
                stop
            ));
        }
        Ok(Self { start, stop })
    }

    /// Degenerate range covering a single instant.
    pub fn instant(timestamp: Timestamp) -> Self {
        Self {
            start: timestamp,
            stop: timestamp,
        }
    }

    /// Whether `timestamp` lies inside the closed interval.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.start <= timestamp && timestamp <= self.stop
    }

    pub fn duration(&self) -> Timestamp {
        self.stop - self.start
    }

    /// Smallest range covering both ranges.
    pub fn hull(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }

    /// Distance from `timestamp` to the closest point of the range (zero if inside).
    pub fn distance_to(&self, timestamp: Timestamp) -> Timestamp {
        if timestamp < self.start {
            self.start - timestamp
        } else if timestamp > self.stop {
            timestamp - self.stop
        } else {
            0
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.stop)
    }
}

/// Identifier assigned to every sensor measurement by its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeasurementId(pub u64);

impl fmt::Display for MeasurementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Discriminant of [`Measurement`], used to look up edge factories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeasurementKind {
    Pose,
    Gps,
    Odometry,
    SplitOdometry,
    Imu,
    Continuous,
    Fake,
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeasurementKind::Pose => "Pose",
            MeasurementKind::Gps => "Gps",
            MeasurementKind::Odometry => "Odometry",
            MeasurementKind::SplitOdometry => "SplitOdometry",
            MeasurementKind::Imu => "Imu",
            MeasurementKind::Continuous => "Continuous",
            MeasurementKind::Fake => "Fake",
        };
        write!(f, "{name}")
    }
}

/// Value-based identity of a measurement.
///
/// Two measurements with equal keys are the same observation, no matter which
/// cluster copy they live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeasurementKey {
    Sensor(MeasurementId),
    Split {
        parent: MeasurementId,
        half: SplitHalf,
    },
    Fake(Timestamp),
    Continuous(TimeRange),
}

/// Absolute SE(3) pose observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseMeasurement {
    pub id: MeasurementId,
    pub timestamp: Timestamp,
    pub pose: Isometry3<f64>,
    pub information: Matrix6<f64>,
}

impl PoseMeasurement {
    pub fn new(id: MeasurementId, timestamp: Timestamp, pose: Isometry3<f64>) -> Self {
        Self {
            id,
            timestamp,
            pose,
            information: Matrix6::identity(),
        }
    }

    pub fn with_information(mut self, information: Matrix6<f64>) -> Self {
        self.information = information;
        self
    }
}

/// GPS position fix.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsMeasurement {
    pub id: MeasurementId,
    pub timestamp: Timestamp,
    pub position: Vector3<f64>,
    pub information: Matrix3<f64>,
}

impl GpsMeasurement {
    pub fn new(id: MeasurementId, timestamp: Timestamp, position: Vector3<f64>) -> Self {
        Self {
            id,
            timestamp,
            position,
            information: Matrix3::identity(),
        }
    }

    pub fn with_information(mut self, information: Matrix3<f64>) -> Self {
        self.information = information;
        self
    }
}

/// Synthetic anchor with no sensor payload.
///
/// Fake measurements seed a leading cluster when an inertial burst starts before
/// every real measurement of the batch. They never count as core content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FakeMeasurement {
    pub timestamp: Timestamp,
}

impl FakeMeasurement {
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }
}

/// One sensor observation or pipeline-generated placeholder.
#[derive(Debug, Clone)]
pub enum Measurement {
    Pose(Arc<PoseMeasurement>),
    Gps(Arc<GpsMeasurement>),
    Odometry(Arc<OdometryMeasurement>),
    SplitOdometry(SplitOdometry),
    Imu(ImuSample),
    Continuous(Arc<ContinuousMeasurement>),
    Fake(FakeMeasurement),
}

impl Measurement {
    /// Timestamp used to place the measurement in a graph moment.
    ///
    /// Interval measurements report the end of their interval.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Measurement::Pose(m) => m.timestamp,
            Measurement::Gps(m) => m.timestamp,
            Measurement::Odometry(m) => m.time_range.stop,
            Measurement::SplitOdometry(m) => m.timestamp(),
            Measurement::Imu(m) => m.timestamp,
            Measurement::Continuous(m) => m.time_range().stop,
            Measurement::Fake(m) => m.timestamp,
        }
    }

    /// Time span covered by the measurement.
    pub fn time_range(&self) -> TimeRange {
        match self {
            Measurement::Odometry(m) => m.time_range,
            Measurement::Continuous(m) => m.time_range(),
            other => TimeRange::instant(other.timestamp()),
        }
    }

    pub fn kind(&self) -> MeasurementKind {
        match self {
            Measurement::Pose(_) => MeasurementKind::Pose,
            Measurement::Gps(_) => MeasurementKind::Gps,
            Measurement::Odometry(_) => MeasurementKind::Odometry,
            Measurement::SplitOdometry(_) => MeasurementKind::SplitOdometry,
            Measurement::Imu(_) => MeasurementKind::Imu,
            Measurement::Continuous(_) => MeasurementKind::Continuous,
            Measurement::Fake(_) => MeasurementKind::Fake,
        }
    }

    pub fn key(&self) -> MeasurementKey {
        match self {
            Measurement::Pose(m) => MeasurementKey::Sensor(m.id),
            Measurement::Gps(m) => MeasurementKey::Sensor(m.id),
            Measurement::Odometry(m) => MeasurementKey::Sensor(m.id),
            Measurement::SplitOdometry(m) => m.key(),
            Measurement::Imu(m) => m.key(),
            Measurement::Continuous(m) => MeasurementKey::Continuous(m.time_range()),
            Measurement::Fake(m) => MeasurementKey::Fake(m.timestamp),
        }
    }

    /// Keys of the raw observations behind this measurement.
    ///
    /// Continuous measurements expand to their samples, everything else to itself.
    pub fn raw_keys(&self) -> Vec<MeasurementKey> {
        match self {
            Measurement::Continuous(m) => m.keys().collect(),
            other => vec![other.key()],
        }
    }

    pub fn is_fake(&self) -> bool {
        matches!(self, Measurement::Fake(_))
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Measurement::Continuous(_))
    }

    /// Whether the measurement contributes to cluster timestamps.
    pub fn is_core(&self) -> bool {
        !self.is_fake() && !self.is_continuous()
    }
}

impl PartialEq for Measurement {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Measurement {}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Pose(m) => write!(f, "Pose({}, t={})", m.id, m.timestamp),
            Measurement::Gps(m) => write!(f, "Gps({}, t={})", m.id, m.timestamp),
            Measurement::Odometry(m) => write!(f, "Odometry({}, {})", m.id, m.time_range),
            Measurement::SplitOdometry(m) => write!(
                f,
                "SplitOdometry({}, {:?}, t={})",
                m.parent().id,
                m.half(),
                m.timestamp()
            ),
            Measurement::Imu(m) => write!(f, "Imu({}, t={})", m.id, m.timestamp),
            Measurement::Continuous(m) => {
                write!(f, "Continuous({} samples, {})", m.len(), m.time_range())
            }
            Measurement::Fake(m) => write!(f, "Fake(t={})", m.timestamp),
        }
    }
}

impl From<PoseMeasurement> for Measurement {
    fn from(m: PoseMeasurement) -> Self {
        Measurement::Pose(Arc::new(m))
    }
}

impl From<GpsMeasurement> for Measurement {
    fn from(m: GpsMeasurement) -> Self {
        Measurement::Gps(Arc::new(m))
    }
}

impl From<OdometryMeasurement> for Measurement {
    fn from(m: OdometryMeasurement) -> Self {
        Measurement::Odometry(Arc::new(m))
    }
}

impl From<SplitOdometry> for Measurement {
    fn from(m: SplitOdometry) -> Self {
        Measurement::SplitOdometry(m)
    }
}

impl From<ImuSample> for Measurement {
    fn from(m: ImuSample) -> Self {
        Measurement::Imu(m)
    }
}

impl From<ContinuousMeasurement> for Measurement {
    fn from(m: ContinuousMeasurement) -> Self {
        Measurement::Continuous(Arc::new(m))
    }
}

impl From<FakeMeasurement> for Measurement {
    fn from(m: FakeMeasurement) -> Self {
        Measurement::Fake(m)
    }
}
