//! Grouping by timestamp and enumeration of contiguous cluster combinations.
//!
//! For `N` time-sorted groups there are `N − 1` cut points between neighbours. Every
//! subset of cut points gives one way of merging neighbouring groups into clusters, so
//! the factory yields exactly `2^(N−1)` combinations. They are produced from the fully
//! split sequence down to a single merged cluster.

use crate::error::FusionResult;
use crate::measurement::{Measurement, MeasurementCluster, Timestamp};

/// One candidate sequence of clusters.
pub type Combination = Vec<MeasurementCluster>;

/// Measurements sharing one timestamp.
#[derive(Debug, Clone)]
pub struct MeasurementGroup {
    timestamp: Timestamp,
    measurements: Vec<Measurement>,
}

impl MeasurementGroup {
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        self.measurements
    }
}

/// Group measurements by timestamp, in time order. Order within a group is kept.
pub fn group_by_timestamp(mut measurements: Vec<Measurement>) -> Vec<MeasurementGroup> {
    measurements.sort_by_key(Measurement::timestamp);
    let mut groups: Vec<MeasurementGroup> = Vec::new();
    for measurement in measurements {
        let timestamp = measurement.timestamp();
        match groups.last_mut() {
            Some(group) if group.timestamp == timestamp => group.measurements.push(measurement),
            _ => groups.push(MeasurementGroup {
                timestamp,
                measurements: vec![measurement],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CombinationFactory;

impl CombinationFactory {
    /// Number of combinations for `num_groups` groups.
    pub fn count(num_groups: usize) -> usize {
        match num_groups {
            0 => 0,
            n => 1usize << (n - 1),
        }
    }

    /// Enumerate every ordered partition of `groups` into contiguous clusters.
    ///
    /// Bit `i` of the mask keeps the cut between group `i` and group `i + 1`.
    pub fn combine(groups: &[MeasurementGroup]) -> FusionResult<Vec<Combination>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        let cuts = groups.len() - 1;
        let mut combinations = Vec::with_capacity(Self::count(groups.len()));

        for mask in (0..(1u64 << cuts)).rev() {
            let mut combination = Vec::new();
            let mut cluster = MeasurementCluster::new();
            for (i, group) in groups.iter().enumerate() {
                for measurement in &group.measurements {
                    cluster.add(measurement.clone())?;
                }
                let is_last = i == cuts;
                if is_last || mask & (1u64 << i) != 0 {
                    combination.push(std::mem::take(&mut cluster));
                }
            }
            combinations.push(combination);
        }
        Ok(combinations)
    }
}
