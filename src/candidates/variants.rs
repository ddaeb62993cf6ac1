//! Variant creation: from a raw batch to every distinct populated topology.
//!
//! The batch is separated into instantaneous measurements and one sorted inertial stream.
//! Instantaneous measurements are grouped by timestamp and enumerated into combinations;
//! combinations with loops are dropped; every remaining combination is bridged by each
//! valid connection chain and filled from the stream; duplicates are removed last.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use crate::candidates::combinations::{CombinationFactory, MeasurementGroup, group_by_timestamp};
use crate::candidates::connections::ConnectionFactory;
use crate::candidates::dedup::remove_duplicates;
use crate::candidates::leftovers::{ClustersWithLeftovers, fill_connections, fill_single_cluster};
use crate::candidates::loops::remove_loops;
use crate::config::CandidateConfig;
use crate::error::{FusionError, FusionResult};
use crate::measurement::odometry::split;
use crate::measurement::{
    FakeMeasurement, ImuSample, Measurement, MeasurementCluster, MeasurementKey,
};
use crate::validation_error;

/// A batch split into its two driving classes.
#[derive(Debug, Clone, Default)]
pub struct SeparatedMeasurements {
    /// Discrete measurements, odometry already split into its two halves
    pub instant: Vec<Measurement>,
    /// Raw inertial samples sorted by timestamp
    pub stream: Vec<ImuSample>,
}

impl SeparatedMeasurements {
    /// Number of core measurements, counting a split odometry once.
    pub fn num_core(&self) -> usize {
        self.instant
            .iter()
            .filter(|m| !matches!(m, Measurement::SplitOdometry(s) if !s.is_stop()))
            .count()
    }

    pub fn has_odometry(&self) -> bool {
        self.instant
            .iter()
            .any(|m| matches!(m, Measurement::SplitOdometry(_)))
    }
}

/// Distinct populated topologies of a batch plus the measurements held back for later.
#[derive(Debug, Clone, Default)]
pub struct Variants {
    pub items: Vec<ClustersWithLeftovers>,
    /// Measurements beyond the group limit, to be retried next cycle
    pub deferred: Vec<Measurement>,
}

#[derive(Debug, Clone, Default)]
pub struct VariantsFactory {
    config: CandidateConfig,
}

impl VariantsFactory {
    pub fn new(config: CandidateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CandidateConfig {
        &self.config
    }

    /// Split a batch into instantaneous measurements and the inertial stream.
    ///
    /// Odometry is decomposed into its start and stop halves. Continuous measurements are
    /// expanded into their samples. Incoming fakes are dropped.
    ///
    /// # Errors
    /// Returns a validation error if two measurements share a key.
    pub fn separate(measurements: Vec<Measurement>) -> FusionResult<SeparatedMeasurements> {
        let mut seen = HashSet::new();
        let mut separated = SeparatedMeasurements::default();

        for measurement in measurements {
            for key in measurement.raw_keys() {
                if !seen.insert(key) {
                    return Err(validation_error!("Measurement {:?} appears twice in the batch", key));
                }
            }
            match measurement {
                Measurement::Odometry(odometry) => {
                    separated
                        .instant
                        .extend(split(&odometry).into_iter().map(Measurement::from));
                }
                Measurement::Imu(sample) => separated.stream.push(sample),
                Measurement::Continuous(continuous) => {
                    separated.stream.extend_from_slice(continuous.items());
                }
                Measurement::Fake(fake) => {
                    debug!("Dropping incoming fake measurement at {}", fake.timestamp);
                }
                other => separated.instant.push(other),
            }
        }
        separated.stream.sort_by_key(|s| s.timestamp);
        Ok(separated)
    }

    /// Check the minimum-content policy.
    fn check_content(&self, separated: &SeparatedMeasurements) -> FusionResult<()> {
        let num_core = separated.num_core();
        if num_core == 0 || num_core < self.config.min_core_measurements {
            return Err(FusionError::NotEnoughMeasurements(format!(
                "{} core measurements, at least {} required",
                num_core,
                self.config.min_core_measurements.max(1)
            )));
        }
        if self.config.require_odometry && !separated.has_odometry() {
            return Err(FusionError::NotEnoughMeasurements(
                "Batch has no odometry measurement".to_string(),
            ));
        }
        Ok(())
    }

    /// Keep the first `max_groups` groups, returning the rest as deferred measurements.
    ///
    /// Split halves in deferred groups are folded back into their parent odometry.
    fn limit_groups(&self, mut groups: Vec<MeasurementGroup>) -> (Vec<MeasurementGroup>, Vec<Measurement>) {
        if groups.len() <= self.config.max_groups {
            return (groups, Vec::new());
        }
        let rest = groups.split_off(self.config.max_groups);
        let mut parents = BTreeSet::new();
        let mut deferred = Vec::new();
        for measurement in rest.into_iter().flat_map(MeasurementGroup::into_measurements) {
            match measurement {
                Measurement::SplitOdometry(half) => {
                    if parents.insert(half.parent().id) {
                        deferred.push(Measurement::Odometry(half.parent().clone()));
                    }
                }
                other => deferred.push(other),
            }
        }
        debug!(
            "Deferring {} measurements beyond {} timestamp groups",
            deferred.len(),
            self.config.max_groups
        );
        (groups, deferred)
    }

    /// Build every distinct populated topology for a batch.
    ///
    /// # Errors
    /// - [`FusionError::NotEnoughMeasurements`] if the batch fails the content policy
    /// - [`FusionError::InfeasibleTopology`] if every combination was rejected
    /// - [`FusionError::Validation`] on duplicated measurements
    pub fn create(&self, measurements: Vec<Measurement>) -> FusionResult<Variants> {
        let separated = Self::separate(measurements)?;
        self.check_content(&separated)?;

        let SeparatedMeasurements { instant, stream } = separated;
        let (groups, deferred) = self.limit_groups(group_by_timestamp(instant));

        let combinations = remove_loops(CombinationFactory::combine(&groups)?);
        if combinations.is_empty() {
            return Err(FusionError::InfeasibleTopology(
                "Every combination places both halves of an odometry in one cluster".to_string(),
            ));
        }

        let fake_start = match (stream.first(), groups.first()) {
            (Some(sample), Some(group)) if sample.timestamp < group.timestamp() => {
                Some(sample.timestamp)
            }
            _ => None,
        };

        let mut items = Vec::new();
        for (order, mut combination) in combinations.into_iter().enumerate() {
            if let Some(timestamp) = fake_start {
                let fake = MeasurementCluster::from_measurements([FakeMeasurement::new(timestamp).into()])?;
                combination.insert(0, fake);
            }
            let before = items.len();
            self.fill(combination, &stream, &mut items)?;
            if items.len() == before {
                debug!("Combination {} produced no viable topology", order);
            }
        }

        let items = remove_duplicates(items);
        if items.is_empty() {
            return Err(FusionError::InfeasibleTopology(
                "No combination could be bridged by the inertial stream".to_string(),
            ));
        }
        debug!("Created {} distinct variants from {} groups", items.len(), groups.len());
        Ok(Variants { items, deferred })
    }

    fn fill(
        &self,
        combination: Vec<MeasurementCluster>,
        stream: &[ImuSample],
        items: &mut Vec<ClustersWithLeftovers>,
    ) -> FusionResult<()> {
        if stream.is_empty() {
            items.push(ClustersWithLeftovers::new(combination, Vec::new()));
            return Ok(());
        }
        if combination.len() == 1 {
            let cluster = combination.into_iter().next().unwrap_or_default();
            match fill_single_cluster(cluster, stream) {
                Ok(filled) => items.push(filled),
                Err(e) => debug!("Skipping single-cluster branch: {}", e),
            }
            return Ok(());
        }
        for topology in ConnectionFactory::topologies(&combination)? {
            match fill_connections(topology, stream) {
                Ok(filled) => items.push(filled),
                Err(e) => debug!("Skipping connection chain: {}", e),
            }
        }
        Ok(())
    }
}

/// Keys of every raw item in a variant, placed or left over.
pub fn covered_keys(item: &ClustersWithLeftovers) -> BTreeSet<MeasurementKey> {
    let (clusters, leftovers) = item.signature();
    clusters.into_iter().flatten().chain(leftovers).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{
        GpsMeasurement, MeasurementId, OdometryMeasurement, PoseMeasurement, TimeRange, Timestamp,
    };
    use nalgebra::{Isometry3, Vector3};

    fn pose(id: u64, timestamp: Timestamp) -> Measurement {
        PoseMeasurement::new(MeasurementId(id), timestamp, Isometry3::identity()).into()
    }

    fn gps(id: u64, timestamp: Timestamp) -> Measurement {
        GpsMeasurement::new(MeasurementId(id), timestamp, Vector3::zeros()).into()
    }

    fn imu(timestamp: Timestamp) -> Measurement {
        ImuSample::new(
            MeasurementId(1000 + timestamp as u64),
            timestamp,
            Vector3::zeros(),
            Vector3::zeros(),
        )
        .into()
    }

    fn odometry(id: u64, start: Timestamp, stop: Timestamp) -> Result<Measurement, Box<dyn std::error::Error>> {
        Ok(OdometryMeasurement::new(MeasurementId(id), TimeRange::new(start, stop)?, Isometry3::identity())?.into())
    }

    #[test]
    fn test_separate_splits_odometry_and_sorts_stream() -> Result<(), Box<dyn std::error::Error>> {
        let separated = VariantsFactory::separate(vec![imu(3), odometry(1, 1, 2)?, imu(1), gps(2, 2)])?;

        assert_eq!(separated.instant.len(), 3);
        assert_eq!(separated.num_core(), 2);
        assert!(separated.has_odometry());
        let stream: Vec<Timestamp> = separated.stream.iter().map(|s| s.timestamp).collect();
        assert_eq!(stream, vec![1, 3]);
        Ok(())
    }

    #[test]
    fn test_separate_rejects_duplicates() {
        let result = VariantsFactory::separate(vec![gps(1, 2), gps(1, 2)]);
        assert!(matches!(result, Err(FusionError::Validation(_))));
    }

    #[test]
    fn test_empty_batch_starves() {
        let factory = VariantsFactory::default();
        let result = factory.create(vec![imu(1), imu(2)]);
        assert!(matches!(result, Err(FusionError::NotEnoughMeasurements(_))));
    }

    #[test]
    fn test_required_odometry_starves() {
        let factory = VariantsFactory::new(CandidateConfig::new().with_require_odometry(true));
        let result = factory.create(vec![gps(1, 2), gps(2, 3)]);
        assert!(matches!(result, Err(FusionError::NotEnoughMeasurements(_))));
    }

    #[test]
    fn test_discrete_only_batch() -> Result<(), Box<dyn std::error::Error>> {
        let factory = VariantsFactory::default();
        let variants = factory.create(vec![pose(1, 1), gps(2, 2), gps(3, 3)])?;

        assert_eq!(variants.items.len(), 4);
        assert!(variants.deferred.is_empty());
        assert!(variants.items.iter().all(|v| v.leftovers.is_empty()));
        Ok(())
    }

    #[test]
    fn test_merged_odometry_halves_are_infeasible() -> Result<(), Box<dyn std::error::Error>> {
        let factory = VariantsFactory::default();
        let variants = factory.create(vec![pose(1, 1), odometry(2, 1, 2)?])?;

        // Only the split combination survives.
        assert_eq!(variants.items.len(), 1);
        assert_eq!(variants.items[0].clusters.len(), 2);
        Ok(())
    }

    #[test]
    fn test_early_stream_seeds_fake_cluster() -> Result<(), Box<dyn std::error::Error>> {
        let factory = VariantsFactory::default();
        let variants = factory.create(vec![gps(1, 5), imu(0), imu(1), imu(2), imu(3), imu(4)])?;

        assert_eq!(variants.items.len(), 1);
        let item = &variants.items[0];
        assert_eq!(item.clusters.len(), 1);
        assert!(item.clusters[0].fake().is_empty());
        assert_eq!(item.clusters[0].continuous()[0].len(), 5);
        assert!(item.leftovers.is_empty());
        Ok(())
    }

    #[test]
    fn test_every_sample_is_accounted_for() -> Result<(), Box<dyn std::error::Error>> {
        let factory = VariantsFactory::default();
        let batch = vec![gps(1, 2), gps(2, 4), gps(3, 6), imu(1), imu(3), imu(5), imu(7)];
        let expected: BTreeSet<MeasurementKey> = batch.iter().flat_map(Measurement::raw_keys).collect();
        let variants = factory.create(batch)?;

        for item in &variants.items {
            assert_eq!(covered_keys(item), expected);
            let total: usize = item
                .clusters
                .iter()
                .flat_map(|c| c.continuous())
                .map(|c| c.len())
                .sum::<usize>()
                + item.leftovers.len();
            assert_eq!(total, 4);
        }
        Ok(())
    }

    #[test]
    fn test_chains_over_sampleless_gaps_are_skipped() -> Result<(), Box<dyn std::error::Error>> {
        let factory = VariantsFactory::default();
        let variants = factory.create(vec![gps(1, 1), gps(2, 3), gps(3, 5), imu(4)])?;

        assert_eq!(variants.items.len(), 3);
        for item in &variants.items {
            assert!(item.clusters.iter().flat_map(|c| c.continuous()).all(|c| !c.is_empty()));
            assert_eq!(covered_keys(item).len(), 4);
        }
        let bridged: Vec<usize> = variants
            .items
            .iter()
            .filter(|item| item.leftovers.is_empty())
            .map(|item| item.clusters.len())
            .collect();
        assert_eq!(bridged, vec![3, 2]);
        Ok(())
    }

    #[test]
    fn test_groups_beyond_limit_are_deferred() -> Result<(), Box<dyn std::error::Error>> {
        let factory = VariantsFactory::new(CandidateConfig::new().with_max_groups(2));
        let variants = factory.create(vec![gps(1, 1), gps(2, 2), gps(3, 3), odometry(4, 3, 4)?])?;

        assert_eq!(variants.items.len(), 2);
        assert_eq!(variants.deferred.len(), 2);
        assert!(
            variants
                .deferred
                .iter()
                .any(|m| matches!(m, Measurement::Odometry(_)))
        );
        Ok(())
    }
}
