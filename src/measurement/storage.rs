//! Measurement storage between ingestion cycles.

use std::collections::{BTreeMap, HashSet};

use crate::error::FusionResult;
use crate::measurement::{Measurement, MeasurementKey, MeasurementKind, TimeRange};
use crate::validation_error;

/// Accumulates measurements until the next batch is processed.
#[derive(Debug, Clone, Default)]
pub struct MeasurementStorage {
    data: BTreeMap<MeasurementKind, Vec<Measurement>>,
    keys: HashSet<MeasurementKey>,
    time_range: Option<TimeRange>,
    recent: Option<Measurement>,
}

impl MeasurementStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one measurement.
    ///
    /// # Errors
    /// Returns a validation error if a measurement with the same key is stored.
    pub fn add(&mut self, measurement: Measurement) -> FusionResult<()> {
        let key = measurement.key();
        if !self.keys.insert(key) {
            return Err(validation_error!("Measurement {} is already stored", measurement));
        }
        let range = measurement.time_range();
        self.time_range = Some(match self.time_range {
            Some(current) => current.hull(&range),
            None => range,
        });
        let is_recent = self
            .recent
            .as_ref()
            .is_none_or(|r| r.time_range().stop <= range.stop);
        if is_recent {
            self.recent = Some(measurement.clone());
        }
        self.data.entry(measurement.kind()).or_default().push(measurement);
        Ok(())
    }

    pub fn extend<I>(&mut self, measurements: I) -> FusionResult<()>
    where
        I: IntoIterator<Item = Measurement>,
    {
        for measurement in measurements {
            self.add(measurement)?;
        }
        Ok(())
    }

    /// Remove one measurement.
    ///
    /// # Errors
    /// Returns a validation error if the measurement is not stored.
    pub fn remove(&mut self, measurement: &Measurement) -> FusionResult<()> {
        let key = measurement.key();
        if !self.keys.remove(&key) {
            return Err(validation_error!("Measurement {} is not stored", measurement));
        }
        if let Some(list) = self.data.get_mut(&measurement.kind()) {
            list.retain(|m| m.key() != key);
            if list.is_empty() {
                self.data.remove(&measurement.kind());
            }
        }
        self.refresh();
        Ok(())
    }

    pub fn contains(&self, measurement: &Measurement) -> bool {
        self.keys.contains(&measurement.key())
    }

    pub fn measurements(&self, kind: MeasurementKind) -> &[Measurement] {
        self.data.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data(&self) -> &BTreeMap<MeasurementKind, Vec<Measurement>> {
        &self.data
    }

    /// # Errors
    /// Returns a validation error if the storage is empty.
    pub fn time_range(&self) -> FusionResult<TimeRange> {
        self.time_range
            .ok_or_else(|| validation_error!("Measurement storage is empty"))
    }

    /// Measurement with the latest end time.
    ///
    /// # Errors
    /// Returns a validation error if the storage is empty.
    pub fn recent_measurement(&self) -> FusionResult<&Measurement> {
        self.recent
            .as_ref()
            .ok_or_else(|| validation_error!("Measurement storage is empty"))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.keys.clear();
        self.time_range = None;
        self.recent = None;
    }

    /// Take every stored measurement, sorted by timestamp.
    pub fn drain(&mut self) -> Vec<Measurement> {
        let mut measurements: Vec<Measurement> =
            std::mem::take(&mut self.data).into_values().flatten().collect();
        measurements.sort_by_key(Measurement::timestamp);
        self.clear();
        measurements
    }

    fn refresh(&mut self) {
        let all = self.data.values().flatten();
        self.time_range = all
            .clone()
            .map(Measurement::time_range)
            .reduce(|a, b| a.hull(&b));
        self.recent = all.max_by_key(|m| m.time_range().stop).cloned();
    }
}
