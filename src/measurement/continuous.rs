//! Raw inertial samples and continuous measurements built from them.

use nalgebra::Vector3;

use crate::error::FusionResult;
use crate::measurement::{MeasurementId, MeasurementKey, TimeRange, Timestamp};
use crate::validation_error;

/// One raw IMU reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    pub id: MeasurementId,
    pub timestamp: Timestamp,
    /// Angular velocity in the body frame (rad/s)
    pub angular_velocity: Vector3<f64>,
    /// Specific force in the body frame (m/s^2)
    pub acceleration: Vector3<f64>,
}

impl ImuSample {
    pub fn new(
        id: MeasurementId,
        timestamp: Timestamp,
        angular_velocity: Vector3<f64>,
        acceleration: Vector3<f64>,
    ) -> Self {
        Self {
            id,
            timestamp,
            angular_velocity,
            acceleration,
        }
    }

    pub fn key(&self) -> MeasurementKey {
        MeasurementKey::Sensor(self.id)
    }
}

/// Ordered run of IMU samples spanning an interval.
///
/// The interval may extend past the samples on either side: a slice `[a, b)` of a stream
/// covers `[a, b]` even when the first sample arrives after `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousMeasurement {
    items: Vec<ImuSample>,
    time_range: TimeRange,
}

impl ContinuousMeasurement {
    /// Create a continuous measurement over an explicit interval.
    ///
    /// # Errors
    /// Returns a validation error if `items` is empty, not sorted by timestamp, or
    /// not contained in `time_range`.
    pub fn new(items: Vec<ImuSample>, time_range: TimeRange) -> FusionResult<Self> {
        let (Some(first), Some(last)) = (items.first(), items.last()) else {
            return Err(validation_error!("Continuous measurement has no items"));
        };
        if items.windows(2).any(|w| w[0].timestamp > w[1].timestamp) {
            return Err(validation_error!(
                "Continuous measurement items are not sorted by timestamp"
            ));
        }
        if !time_range.contains(first.timestamp) || !time_range.contains(last.timestamp) {
            return Err(validation_error!(
                "Items [{}, {}] exceed time range {}",
                first.timestamp,
                last.timestamp,
                time_range
            ));
        }
        Ok(Self { items, time_range })
    }

    /// Create a continuous measurement spanning exactly its first and last sample.
    pub fn from_items(items: Vec<ImuSample>) -> FusionResult<Self> {
        let (Some(first), Some(last)) = (items.first(), items.last()) else {
            return Err(validation_error!("Continuous measurement has no items"));
        };
        let time_range = TimeRange::new(first.timestamp, last.timestamp)?;
        Self::new(items, time_range)
    }

    pub fn items(&self) -> &[ImuSample] {
        &self.items
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = MeasurementKey> + '_ {
        self.items.iter().map(ImuSample::key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: u64, timestamp: Timestamp) -> ImuSample {
        ImuSample::new(
            MeasurementId(id),
            timestamp,
            Vector3::zeros(),
            Vector3::new(0.0, 0.0, 9.81),
        )
    }

    #[test]
    fn test_rejects_empty_items() {
        assert!(ContinuousMeasurement::from_items(Vec::new()).is_err());
        assert!(ContinuousMeasurement::new(Vec::new(), TimeRange::instant(0)).is_err());
    }

    #[test]
    fn test_rejects_unsorted_items() {
        let items = vec![sample(1, 3), sample(2, 1)];
        assert!(ContinuousMeasurement::from_items(items).is_err());
    }

    #[test]
    fn test_rejects_items_outside_range() -> Result<(), Box<dyn std::error::Error>> {
        let items = vec![sample(1, 1), sample(2, 9)];
        assert!(ContinuousMeasurement::new(items, TimeRange::new(0, 5)?).is_err());
        Ok(())
    }

    #[test]
    fn test_range_may_extend_past_items() -> Result<(), Box<dyn std::error::Error>> {
        let items = vec![sample(1, 2), sample(2, 3), sample(3, 4)];
        let continuous = ContinuousMeasurement::new(items, TimeRange::new(1, 5)?)?;

        assert_eq!(continuous.len(), 3);
        assert_eq!(continuous.time_range(), TimeRange::new(1, 5)?);
        assert_eq!(continuous.keys().count(), 3);
        Ok(())
    }
}
