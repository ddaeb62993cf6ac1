//! Leftover-aware slicing of the continuous stream.
//!
//! Every connection `(c1, c2)` receives the samples in `[c1.timestamp, c2.timestamp)` as
//! one continuous measurement deposited into `c2`. Fake anchors change where a slice
//! starts:
//! 1. `c1` holds only a fake: the slice starts at the fake and `c1` is dropped.
//! 2. `c1` holds a fake and real measurements: `[fake, c1)` goes into `c1` and the fake is
//!    removed, then `[c1, c2)` goes into `c2`.
//! 3. otherwise `[c1, c2)` goes into `c2`.
//!
//! A slice over an empty or inverted range, or one that catches no samples, is an error
//! and rejects the whole topology. Samples no slice consumed are returned as leftovers,
//! sorted by timestamp.

use std::collections::{BTreeSet, HashSet};

use crate::candidates::connections::CandidateTopology;
use crate::error::FusionResult;
use crate::measurement::{
    ContinuousMeasurement, ImuSample, MeasurementCluster, MeasurementKey, TimeRange, Timestamp,
};
use crate::validation_error;

/// Samples of a sorted stream in the half-open range `[start, stop)`.
///
/// # Errors
/// Returns a validation error if the stream is empty or `start >= stop`.
pub fn get_subsequence(items: &[ImuSample], start: Timestamp, stop: Timestamp) -> FusionResult<&[ImuSample]> {
    if items.is_empty() {
        return Err(validation_error!("Cannot slice an empty stream"));
    }
    if start >= stop {
        return Err(validation_error!(
            "Cannot slice empty or inverted range [{}, {})",
            start,
            stop
        ));
    }
    let lo = items.partition_point(|s| s.timestamp < start);
    let hi = items.partition_point(|s| s.timestamp < stop);
    Ok(&items[lo..hi])
}

/// A fully populated topology plus the samples it left unused.
#[derive(Debug, Clone)]
pub struct ClustersWithLeftovers {
    pub clusters: Vec<MeasurementCluster>,
    pub leftovers: Vec<ImuSample>,
}

/// Value-based identity of a [`ClustersWithLeftovers`].
pub type Signature = (Vec<BTreeSet<MeasurementKey>>, BTreeSet<MeasurementKey>);

impl ClustersWithLeftovers {
    pub fn new(clusters: Vec<MeasurementCluster>, leftovers: Vec<ImuSample>) -> Self {
        Self {
            clusters,
            leftovers,
        }
    }

    /// Per-cluster item sets with continuous measurements expanded, plus the leftover set.
    pub fn signature(&self) -> Signature {
        (
            self.clusters.iter().map(MeasurementCluster::item_keys).collect(),
            self.leftovers.iter().map(ImuSample::key).collect(),
        )
    }
}

struct Slicer<'a> {
    stream: &'a [ImuSample],
    used: HashSet<MeasurementKey>,
}

impl<'a> Slicer<'a> {
    fn new(stream: &'a [ImuSample]) -> Self {
        Self {
            stream,
            used: HashSet::new(),
        }
    }

    /// Slice `[start, stop)` and deposit it into `cluster`.
    fn deposit(&mut self, cluster: &mut MeasurementCluster, start: Timestamp, stop: Timestamp) -> FusionResult<()> {
        let slice = get_subsequence(self.stream, start, stop)?;
        if slice.is_empty() {
            return Err(validation_error!("No samples in [{}, {})", start, stop));
        }
        for sample in slice {
            if !self.used.insert(sample.key()) {
                return Err(validation_error!(
                    "Sample {} at {} is consumed twice",
                    sample.id,
                    sample.timestamp
                ));
            }
        }
        let continuous = ContinuousMeasurement::new(slice.to_vec(), TimeRange::new(start, stop)?)?;
        cluster.add(continuous.into())
    }

    fn leftovers(&self) -> Vec<ImuSample> {
        let mut leftovers: Vec<ImuSample> = self
            .stream
            .iter()
            .filter(|s| !self.used.contains(&s.key()))
            .copied()
            .collect();
        leftovers.sort_by_key(|s| s.timestamp);
        leftovers
    }
}

/// Fill every connection of `topology` from `stream`.
///
/// # Errors
/// Returns a validation error if a slice range is empty or inverted, a slice holds no
/// samples, a sample would be consumed twice, or a connection ends in a cluster without
/// core measurements.
pub fn fill_connections(topology: CandidateTopology, stream: &[ImuSample]) -> FusionResult<ClustersWithLeftovers> {
    let (mut clusters, connections) = topology.into_parts();
    let mut slicer = Slicer::new(stream);
    let mut dropped = BTreeSet::new();

    for connection in connections {
        let (i, j) = (connection.cluster1(), connection.cluster2());
        let stop = clusters[j].timestamp()?;
        let fake_start = clusters[i].fake().iter().map(|f| f.timestamp).min();

        if clusters[i].is_fake_only() {
            let start = clusters[i].anchor_timestamp()?;
            slicer.deposit(&mut clusters[j], start, stop)?;
            dropped.insert(i);
        } else if let Some(fake) = fake_start {
            let middle = clusters[i].timestamp()?;
            slicer.deposit(&mut clusters[i], fake, middle)?;
            clusters[i].remove_fakes();
            slicer.deposit(&mut clusters[j], middle, stop)?;
        } else {
            let start = clusters[i].timestamp()?;
            slicer.deposit(&mut clusters[j], start, stop)?;
        }
    }

    let leftovers = slicer.leftovers();
    let clusters = clusters
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(i))
        .map(|(_, c)| c)
        .collect();
    Ok(ClustersWithLeftovers::new(clusters, leftovers))
}

/// Fill a lone cluster with the samples from the start of the stream up to its timestamp.
///
/// Samples at or after the cluster timestamp are leftovers, so a stream starting at or
/// after the cluster deposits nothing. Fakes are removed.
pub fn fill_single_cluster(mut cluster: MeasurementCluster, stream: &[ImuSample]) -> FusionResult<ClustersWithLeftovers> {
    let mut slicer = Slicer::new(stream);
    let stop = cluster.timestamp()?;
    if let Some(first) = stream.first()
        && first.timestamp < stop
    {
        slicer.deposit(&mut cluster, first.timestamp, stop)?;
    }
    cluster.remove_fakes();
    let leftovers = slicer.leftovers();
    Ok(ClustersWithLeftovers::new(vec![cluster], leftovers))
}
