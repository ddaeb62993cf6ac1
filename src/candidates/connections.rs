//! Connections between clusters and the enumeration of bridging chains.
//!
//! A connection is the obligation to bridge two clusters with one continuous segment.
//! For `M` clusters every valid bridging is a forward chain from the first cluster to the
//! last one; each intermediate cluster is either visited or skipped, which gives
//! `2^(M−2)` chains. Chains whose anchor timestamps do not strictly increase are dropped.

use crate::error::FusionResult;
use crate::measurement::{MeasurementCluster, Timestamp};
use crate::validation_error;

/// Bridge between two distinct clusters of a topology, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    cluster1: usize,
    cluster2: usize,
}

impl Connection {
    /// # Errors
    /// Returns a validation error if both ends are the same cluster.
    pub fn new(cluster1: usize, cluster2: usize) -> FusionResult<Self> {
        if cluster1 == cluster2 {
            return Err(validation_error!(
                "Connection cannot join cluster {} to itself",
                cluster1
            ));
        }
        Ok(Self { cluster1, cluster2 })
    }

    pub fn cluster1(&self) -> usize {
        self.cluster1
    }

    pub fn cluster2(&self) -> usize {
        self.cluster2
    }
}

/// One hypothesis of clusters plus the connections bridging them.
#[derive(Debug, Clone)]
pub struct CandidateTopology {
    clusters: Vec<MeasurementCluster>,
    connections: Vec<Connection>,
}

impl CandidateTopology {
    /// # Errors
    /// Returns a validation error if a connection points outside `clusters`.
    pub fn new(clusters: Vec<MeasurementCluster>, connections: Vec<Connection>) -> FusionResult<Self> {
        if let Some(c) = connections
            .iter()
            .find(|c| c.cluster1 >= clusters.len() || c.cluster2 >= clusters.len())
        {
            return Err(validation_error!(
                "Connection ({}, {}) is outside the topology of {} clusters",
                c.cluster1,
                c.cluster2,
                clusters.len()
            ));
        }
        Ok(Self {
            clusters,
            connections,
        })
    }

    pub fn clusters(&self) -> &[MeasurementCluster] {
        &self.clusters
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn into_parts(self) -> (Vec<MeasurementCluster>, Vec<Connection>) {
        (self.clusters, self.connections)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionFactory;

impl ConnectionFactory {
    /// Enumerate connection chains for `clusters`, most connected first.
    ///
    /// Returns no chains for fewer than two clusters.
    pub fn combine(clusters: &[MeasurementCluster]) -> FusionResult<Vec<Vec<Connection>>> {
        let m = clusters.len();
        if m < 2 {
            return Ok(Vec::new());
        }
        let anchors: Vec<Timestamp> = clusters
            .iter()
            .map(MeasurementCluster::anchor_timestamp)
            .collect::<FusionResult<_>>()?;
        let intermediates = m - 2;

        let mut chains = Vec::new();
        for mask in (0..(1u64 << intermediates)).rev() {
            let mut nodes = vec![0];
            nodes.extend((0..intermediates).filter(|i| mask & (1u64 << i) != 0).map(|i| i + 1));
            nodes.push(m - 1);

            if nodes.windows(2).any(|w| anchors[w[0]] >= anchors[w[1]]) {
                continue;
            }
            let chain = nodes
                .windows(2)
                .map(|w| Connection::new(w[0], w[1]))
                .collect::<FusionResult<Vec<_>>>()?;
            chains.push(chain);
        }
        Ok(chains)
    }

    /// Pair `clusters` with every chain into topologies.
    pub fn topologies(clusters: &[MeasurementCluster]) -> FusionResult<Vec<CandidateTopology>> {
        Self::combine(clusters)?
            .into_iter()
            .map(|chain| CandidateTopology::new(clusters.to_vec(), chain))
            .collect()
    }
}
