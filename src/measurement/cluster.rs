//! Measurement cluster: the measurements assigned to one graph moment.
//!
//! A cluster keeps three sub-lists:
//! - core: discrete measurements that define the moment's timestamp
//! - continuous: bursts bridging the previous moment to this one
//! - fake: synthetic anchors seeding a leading moment
//!
//! The cluster timestamp is the lower median of the core timestamps and the time range
//! spans the core timestamps. Both are undefined while the cluster has no core content.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::FusionResult;
use crate::measurement::{
    ContinuousMeasurement, FakeMeasurement, Measurement, MeasurementKey, TimeRange, Timestamp,
};
use crate::validation_error;

#[derive(Debug, Clone, Default)]
pub struct MeasurementCluster {
    core: Vec<Measurement>,
    continuous: Vec<Arc<ContinuousMeasurement>>,
    fake: Vec<FakeMeasurement>,
    timestamp: Option<Timestamp>,
    time_range: Option<TimeRange>,
}

impl MeasurementCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cluster from a set of measurements.
    pub fn from_measurements<I>(measurements: I) -> FusionResult<Self>
    where
        I: IntoIterator<Item = Measurement>,
    {
        let mut cluster = Self::new();
        for measurement in measurements {
            cluster.add(measurement)?;
        }
        Ok(cluster)
    }

    /// Add a measurement to the matching sub-list.
    ///
    /// # Errors
    /// Returns a validation error if a measurement with the same key is already present.
    pub fn add(&mut self, measurement: Measurement) -> FusionResult<()> {
        let key = measurement.key();
        if self.contains(&key) {
            return Err(validation_error!(
                "Measurement {} is already in the cluster",
                measurement
            ));
        }
        match measurement {
            Measurement::Continuous(continuous) => self.continuous.push(continuous),
            Measurement::Fake(fake) => self.fake.push(fake),
            core => {
                self.core.push(core);
                self.refresh();
            }
        }
        Ok(())
    }

    /// Remove a measurement by key.
    ///
    /// # Errors
    /// Returns a validation error if the measurement is not in the cluster.
    pub fn remove(&mut self, measurement: &Measurement) -> FusionResult<()> {
        let key = measurement.key();
        if let Some(pos) = self.core.iter().position(|m| m.key() == key) {
            self.core.remove(pos);
            self.refresh();
            return Ok(());
        }
        if let Some(pos) = self
            .continuous
            .iter()
            .position(|c| MeasurementKey::Continuous(c.time_range()) == key)
        {
            self.continuous.remove(pos);
            return Ok(());
        }
        if let Some(pos) = self
            .fake
            .iter()
            .position(|f| MeasurementKey::Fake(f.timestamp) == key)
        {
            self.fake.remove(pos);
            return Ok(());
        }
        Err(validation_error!(
            "Measurement {} is not in the cluster",
            measurement
        ))
    }

    /// Remove every fake measurement, returning how many were removed.
    pub fn remove_fakes(&mut self) -> usize {
        let removed = self.fake.len();
        self.fake.clear();
        removed
    }

    pub fn contains(&self, key: &MeasurementKey) -> bool {
        self.core.iter().any(|m| m.key() == *key)
            || self
                .continuous
                .iter()
                .any(|c| MeasurementKey::Continuous(c.time_range()) == *key)
            || self
                .fake
                .iter()
                .any(|f| MeasurementKey::Fake(f.timestamp) == *key)
    }

    /// Representative timestamp of the moment.
    ///
    /// # Errors
    /// Returns a validation error if the cluster has no core measurement.
    pub fn timestamp(&self) -> FusionResult<Timestamp> {
        self.timestamp
            .ok_or_else(|| validation_error!("Cluster has no core measurement"))
    }

    /// Span of the core timestamps.
    ///
    /// # Errors
    /// Returns a validation error if the cluster has no core measurement.
    pub fn time_range(&self) -> FusionResult<TimeRange> {
        self.time_range
            .ok_or_else(|| validation_error!("Cluster has no core measurement"))
    }

    /// Timestamp a connection starts or ends at: the core timestamp, or the earliest
    /// fake when the cluster holds only fakes.
    pub fn anchor_timestamp(&self) -> FusionResult<Timestamp> {
        match self.timestamp {
            Some(t) => Ok(t),
            None => self
                .fake
                .iter()
                .map(|f| f.timestamp)
                .min()
                .ok_or_else(|| validation_error!("Cluster is empty")),
        }
    }

    pub fn core(&self) -> &[Measurement] {
        &self.core
    }

    pub fn continuous(&self) -> &[Arc<ContinuousMeasurement>] {
        &self.continuous
    }

    pub fn fake(&self) -> &[FakeMeasurement] {
        &self.fake
    }

    pub fn has_core(&self) -> bool {
        !self.core.is_empty()
    }

    /// Whether the cluster holds exactly one measurement and it is fake.
    pub fn is_fake_only(&self) -> bool {
        self.core.is_empty() && self.continuous.is_empty() && self.fake.len() == 1
    }

    /// All measurements in processing order: core first, then continuous, then fakes.
    pub fn measurements(&self) -> Vec<Measurement> {
        self.core
            .iter()
            .cloned()
            .chain(
                self.continuous
                    .iter()
                    .map(|c| Measurement::Continuous(Arc::clone(c))),
            )
            .chain(self.fake.iter().map(|f| Measurement::Fake(*f)))
            .collect()
    }

    /// Keys of every raw item, with continuous measurements expanded to their samples.
    pub fn item_keys(&self) -> BTreeSet<MeasurementKey> {
        self.measurements()
            .iter()
            .flat_map(Measurement::raw_keys)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.core.len() + self.continuous.len() + self.fake.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn refresh(&mut self) {
        let mut timestamps: Vec<Timestamp> = self.core.iter().map(Measurement::timestamp).collect();
        timestamps.sort_unstable();
        match (timestamps.first(), timestamps.last()) {
            (Some(&first), Some(&last)) => {
                self.timestamp = Some(timestamps[(timestamps.len() - 1) / 2]);
                self.time_range = Some(TimeRange {
                    start: first,
                    stop: last,
                });
            }
            _ => {
                self.timestamp = None;
                self.time_range = None;
            }
        }
    }
}
