//! Vertex storage: vertices, their clusters and the timestamp table.
//!
//! Clusters are kept in time order. New clusters almost always belong at the end, so
//! the insertion point is found by scanning backward from the most recent cluster.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use tracing::error;

use crate::graph::cluster::{ClusterId, VertexCluster};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::{Vertex, VertexId, VertexKind, VertexValue};
use crate::measurement::Timestamp;

/// Allocation counters of a [`VertexStorage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct VertexCounters {
    next_cluster: usize,
    next_index: BTreeMap<VertexKind, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct VertexStorage {
    clusters: BTreeMap<ClusterId, VertexCluster>,
    order: Vec<ClusterId>,
    vertices: BTreeMap<VertexId, Vertex>,
    owners: BTreeMap<VertexId, ClusterId>,
    timestamp_table: BTreeMap<Timestamp, ClusterId>,
    next_cluster: usize,
    next_index: BTreeMap<VertexKind, usize>,
}

impl VertexStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if `timestamp` already belongs to a cluster other than `cluster`.
    pub fn check_timestamp(&self, timestamp: Timestamp, cluster: ClusterId) -> GraphResult<()> {
        match self.timestamp_table.get(&timestamp) {
            Some(&existing) if existing != cluster => Err(GraphError::TimestampTaken {
                timestamp,
                existing,
            }),
            _ => Ok(()),
        }
    }

    /// Insert a new vertex into `cluster` at `timestamp`.
    ///
    /// # Errors
    /// - [`GraphError::VertexExists`] if the vertex is already stored
    /// - [`GraphError::TimestampTaken`] if another cluster owns `timestamp`
    pub fn add(&mut self, vertex: Vertex, cluster: ClusterId, timestamp: Timestamp) -> GraphResult<()> {
        let id = vertex.id;
        if self.vertices.contains_key(&id) {
            error!("Vertex {} already exists", id);
            return Err(GraphError::VertexExists(id));
        }
        if let Err(e) = self.check_timestamp(timestamp, cluster) {
            error!("Cannot add vertex {}: {}", id, e);
            return Err(e);
        }

        self.clusters.entry(cluster).or_default().add(id, timestamp);
        self.timestamp_table.insert(timestamp, cluster);
        self.owners.insert(id, cluster);
        self.vertices.insert(id, vertex);

        let next = self.next_index.entry(id.kind).or_insert(0);
        *next = (*next).max(id.index + 1);
        self.next_cluster = self.next_cluster.max(cluster.0 + 1);
        self.reposition(cluster);
        Ok(())
    }

    /// Register another use of an existing vertex at `timestamp`.
    pub fn add_vertex_timestamp(&mut self, vertex: VertexId, timestamp: Timestamp) -> GraphResult<()> {
        let cluster = self.owner(vertex)?;
        if let Err(e) = self.check_timestamp(timestamp, cluster) {
            error!("Cannot register vertex {} at {}: {}", vertex, timestamp, e);
            return Err(e);
        }
        self.clusters
            .get_mut(&cluster)
            .ok_or(GraphError::ClusterNotFound(cluster))?
            .add(vertex, timestamp);
        self.timestamp_table.insert(timestamp, cluster);
        self.reposition(cluster);
        Ok(())
    }

    /// Release one use of a vertex at `timestamp`.
    ///
    /// The vertex is removed once it has no timestamps left, and its cluster once the
    /// cluster is empty. Returns `true` if the vertex was removed.
    pub fn remove_vertex_timestamp(&mut self, vertex: VertexId, timestamp: Timestamp) -> GraphResult<bool> {
        let cluster_id = self.owner(vertex)?;
        let cluster = self
            .clusters
            .get_mut(&cluster_id)
            .ok_or(GraphError::ClusterNotFound(cluster_id))?;
        let vertex_gone = cluster.remove(vertex, timestamp)?;
        if !cluster.contains_timestamp(timestamp) {
            self.timestamp_table.remove(&timestamp);
        }
        if vertex_gone {
            self.vertices.remove(&vertex);
            self.owners.remove(&vertex);
        }
        self.settle(cluster_id);
        Ok(vertex_gone)
    }

    /// Remove a vertex with all of its timestamp uses.
    pub fn remove(&mut self, vertex: VertexId) -> GraphResult<Vertex> {
        let cluster_id = self.owner(vertex)?;
        let cluster = self
            .clusters
            .get_mut(&cluster_id)
            .ok_or(GraphError::ClusterNotFound(cluster_id))?;
        let timestamps: Vec<Timestamp> = cluster
            .vertex_timestamps(&vertex)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default();
        cluster.remove_vertex(vertex)?;
        for timestamp in timestamps {
            if !cluster.contains_timestamp(timestamp) {
                self.timestamp_table.remove(&timestamp);
            }
        }
        self.owners.remove(&vertex);
        let removed = self
            .vertices
            .remove(&vertex)
            .ok_or(GraphError::VertexNotFound(vertex))?;
        self.settle(cluster_id);
        Ok(removed)
    }

    pub fn get(&self, vertex: &VertexId) -> Option<&Vertex> {
        self.vertices.get(vertex)
    }

    pub fn contains(&self, vertex: &VertexId) -> bool {
        self.vertices.contains_key(vertex)
    }

    /// Overwrite the value of a stored vertex.
    pub fn set_value(&mut self, vertex: VertexId, value: VertexValue) -> GraphResult<()> {
        let stored = self
            .vertices
            .get_mut(&vertex)
            .ok_or(GraphError::VertexNotFound(vertex))?;
        if value.kind() != vertex.kind {
            return Err(GraphError::ValueMismatch {
                vertex,
                value: value.kind().to_string(),
            });
        }
        stored.value = value;
        Ok(())
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&VertexCluster> {
        self.clusters.get(&id)
    }

    pub fn cluster_of(&self, vertex: &VertexId) -> Option<ClusterId> {
        self.owners.get(vertex).copied()
    }

    /// Clusters in time order.
    pub fn clusters(&self) -> impl Iterator<Item = (ClusterId, &VertexCluster)> {
        self.order
            .iter()
            .filter_map(|id| self.clusters.get(id).map(|c| (*id, c)))
    }

    /// Cluster owning `timestamp` exactly, or whose time range contains it.
    pub fn get_cluster(&self, timestamp: Timestamp) -> Option<ClusterId> {
        if let Some(&id) = self.timestamp_table.get(&timestamp) {
            return Some(id);
        }
        self.clusters()
            .find(|(_, c)| c.time_range().is_some_and(|r| r.contains(timestamp)))
            .map(|(id, _)| id)
    }

    /// Vertex of `kind` with a timestamp closest to `timestamp`, within `threshold`.
    ///
    /// Ties go to the most recently created vertex.
    pub fn nearest_vertex(
        &self,
        kind: VertexKind,
        timestamp: Timestamp,
        threshold: Timestamp,
    ) -> Option<VertexId> {
        self.vertices
            .keys()
            .filter(|v| v.kind == kind)
            .filter_map(|v| {
                let cluster = self.clusters.get(self.owners.get(v)?)?;
                let distance = cluster
                    .vertex_timestamps(v)?
                    .keys()
                    .map(|t| (t - timestamp).abs())
                    .min()?;
                (distance <= threshold).then_some((distance, *v))
            })
            .min_by_key(|(distance, v)| (*distance, Reverse(v.index)))
            .map(|(_, v)| v)
    }

    /// Vertex of `kind` with the highest index.
    pub fn last_vertex(&self, kind: VertexKind) -> Option<VertexId> {
        self.vertices.keys().rev().find(|v| v.kind == kind).copied()
    }

    /// Next unused index for `kind`. Indices of removed vertices are not reused.
    pub fn next_index(&self, kind: VertexKind) -> usize {
        self.next_index.get(&kind).copied().unwrap_or(0)
    }

    pub fn next_cluster_id(&self) -> ClusterId {
        ClusterId(self.next_cluster)
    }

    /// Current vertex and cluster allocation counters.
    pub(crate) fn counters(&self) -> VertexCounters {
        VertexCounters {
            next_cluster: self.next_cluster,
            next_index: self.next_index.clone(),
        }
    }

    /// Wind the allocation counters back to `counters`, never below a stored vertex
    /// or cluster.
    pub(crate) fn restore_counters(&mut self, counters: VertexCounters) {
        let mut next_index = counters.next_index;
        for id in self.vertices.keys() {
            let next = next_index.entry(id.kind).or_insert(0);
            *next = (*next).max(id.index + 1);
        }
        let next_cluster = self
            .clusters
            .keys()
            .map(|c| c.0 + 1)
            .fold(counters.next_cluster, usize::max);
        self.next_index = next_index;
        self.next_cluster = next_cluster;
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn num_clusters(&self) -> usize {
        self.clusters.len()
    }

    fn owner(&self, vertex: VertexId) -> GraphResult<ClusterId> {
        self.owners
            .get(&vertex)
            .copied()
            .ok_or(GraphError::VertexNotFound(vertex))
    }

    fn settle(&mut self, id: ClusterId) {
        if self.clusters.get(&id).is_some_and(VertexCluster::is_empty) {
            self.clusters.remove(&id);
            self.order.retain(|c| *c != id);
        } else {
            self.reposition(id);
        }
    }

    fn start_of(&self, id: ClusterId) -> Option<Timestamp> {
        self.clusters.get(&id)?.time_range().map(|r| r.start)
    }

    fn reposition(&mut self, id: ClusterId) {
        self.order.retain(|c| *c != id);
        let Some(start) = self.start_of(id) else {
            return;
        };
        let mut pos = self.order.len();
        while pos > 0 && self.start_of(self.order[pos - 1]).is_some_and(|s| s > start) {
            pos -= 1;
        }
        self.order.insert(pos, id);
    }
}
