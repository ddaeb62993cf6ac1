//! Vertex clusters: the committed-graph side of a graph moment.
//!
//! A cluster records, for every vertex it owns, the timestamps at which edges use the
//! vertex together with a reference count. A timestamp is released once no edge uses it
//! and a vertex leaves the cluster once it has no timestamps left.

use std::collections::BTreeMap;
use std::fmt;

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::{VertexId, VertexKind};
use crate::measurement::{TimeRange, Timestamp};

/// Stable handle of a vertex cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexCluster {
    vertices: BTreeMap<VertexId, BTreeMap<Timestamp, usize>>,
    timestamps: BTreeMap<Timestamp, usize>,
}

impl VertexCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one use of `vertex` at `timestamp`.
    pub fn add(&mut self, vertex: VertexId, timestamp: Timestamp) {
        *self
            .vertices
            .entry(vertex)
            .or_default()
            .entry(timestamp)
            .or_insert(0) += 1;
        *self.timestamps.entry(timestamp).or_insert(0) += 1;
    }

    /// Release one use of `vertex` at `timestamp`.
    ///
    /// Returns `true` if the vertex has no timestamps left and was dropped.
    pub fn remove(&mut self, vertex: VertexId, timestamp: Timestamp) -> GraphResult<bool> {
        let table = self
            .vertices
            .get_mut(&vertex)
            .ok_or(GraphError::VertexNotFound(vertex))?;
        let count = table
            .get_mut(&timestamp)
            .ok_or(GraphError::TimestampNotFound { vertex, timestamp })?;
        *count -= 1;
        if *count == 0 {
            table.remove(&timestamp);
        }
        let vertex_gone = table.is_empty();
        if vertex_gone {
            self.vertices.remove(&vertex);
        }
        self.release_timestamp(timestamp, 1);
        Ok(vertex_gone)
    }

    /// Drop a vertex with every timestamp use it holds.
    pub fn remove_vertex(&mut self, vertex: VertexId) -> GraphResult<()> {
        let table = self
            .vertices
            .remove(&vertex)
            .ok_or(GraphError::VertexNotFound(vertex))?;
        for (timestamp, count) in table {
            self.release_timestamp(timestamp, count);
        }
        Ok(())
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.vertices.contains_key(vertex)
    }

    pub fn contains_timestamp(&self, timestamp: Timestamp) -> bool {
        self.timestamps.contains_key(&timestamp)
    }

    pub fn vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys().copied()
    }

    pub fn vertices_of_kind(&self, kind: VertexKind) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices().filter(move |v| v.kind == kind)
    }

    pub fn vertex_timestamps(&self, vertex: &VertexId) -> Option<&BTreeMap<Timestamp, usize>> {
        self.vertices.get(vertex)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.timestamps.keys().copied()
    }

    pub fn time_range(&self) -> Option<TimeRange> {
        let start = *self.timestamps.keys().next()?;
        let stop = *self.timestamps.keys().next_back()?;
        Some(TimeRange { start, stop })
    }

    /// Lower median of the registered timestamps.
    pub fn timestamp(&self) -> Option<Timestamp> {
        let n = self.timestamps.len();
        if n == 0 {
            return None;
        }
        self.timestamps.keys().nth((n - 1) / 2).copied()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    fn release_timestamp(&mut self, timestamp: Timestamp, count: usize) {
        if let Some(total) = self.timestamps.get_mut(&timestamp) {
            *total = total.saturating_sub(count);
            if *total == 0 {
                self.timestamps.remove(&timestamp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_counting() -> Result<(), Box<dyn std::error::Error>> {
        let mut cluster = VertexCluster::new();
        let pose = VertexId::pose(0);
        cluster.add(pose, 5);
        cluster.add(pose, 5);

        assert!(!cluster.remove(pose, 5)?);
        assert!(cluster.contains(&pose));
        assert!(cluster.remove(pose, 5)?);
        assert!(cluster.is_empty());
        assert!(cluster.time_range().is_none());
        Ok(())
    }

    #[test]
    fn test_remove_unknown_timestamp_fails() {
        let mut cluster = VertexCluster::new();
        cluster.add(VertexId::pose(0), 5);

        assert_eq!(
            cluster.remove(VertexId::pose(0), 6),
            Err(GraphError::TimestampNotFound {
                vertex: VertexId::pose(0),
                timestamp: 6
            })
        );
        assert!(cluster.remove(VertexId::pose(1), 5).is_err());
    }

    #[test]
    fn test_time_range_and_median() -> Result<(), Box<dyn std::error::Error>> {
        let mut cluster = VertexCluster::new();
        cluster.add(VertexId::pose(0), 3);
        cluster.add(VertexId::velocity(0), 1);
        cluster.add(VertexId::imu_bias(0), 7);

        assert_eq!(cluster.time_range(), Some(TimeRange::new(1, 7)?));
        assert_eq!(cluster.timestamp(), Some(3));
        assert_eq!(cluster.vertices_of_kind(VertexKind::Pose).count(), 1);

        cluster.remove_vertex(VertexId::imu_bias(0))?;
        assert_eq!(cluster.time_range(), Some(TimeRange::new(1, 3)?));
        Ok(())
    }
}
