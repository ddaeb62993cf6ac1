//! The committed estimation graph.
//!
//! [`Graph`] ties vertex storage, edge storage and the vertex→edge adjacency together and
//! is the only place they are mutated. All mutations validate before they touch any
//! table, so a failed call leaves the graph unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, error};

use crate::graph::edge::{Edge, EdgeIndex, EdgeStorage, GraphElement};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::storage::{VertexCounters, VertexStorage};
use crate::graph::{ClusterId, Vertex, VertexId, VertexKind, VertexValue};
use crate::measurement::Timestamp;

/// Statistics about the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphStatistics {
    pub num_vertices: usize,
    pub num_poses: usize,
    pub num_velocities: usize,
    pub num_biases: usize,
    pub num_edges: usize,
    pub num_clusters: usize,
    pub next_edge_index: usize,
}

impl fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Graph Statistics:\n\
             Vertices: {} (poses: {}, velocities: {}, biases: {})\n\
             Edges: {} (next index: {})\n\
             Clusters: {}",
            self.num_vertices,
            self.num_poses,
            self.num_velocities,
            self.num_biases,
            self.num_edges,
            self.next_edge_index,
            self.num_clusters
        )
    }
}

/// Edge and vertex allocation state of a [`Graph`] at one point in time.
#[derive(Debug, Clone)]
pub(crate) struct GraphMark {
    next_edge: EdgeIndex,
    counters: VertexCounters,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertex_storage: VertexStorage,
    edge_storage: EdgeStorage,
    adjacency: BTreeMap<VertexId, BTreeSet<EdgeIndex>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit an edge together with the vertices it introduces.
    ///
    /// The edge receives the next running index. New vertices are inserted into their
    /// clusters, existing vertices get the edge's timestamp registered.
    ///
    /// # Errors
    /// Fails without modifying the graph if the element is malformed, references an
    /// unknown vertex, re-creates an existing vertex or places a timestamp in a second
    /// cluster.
    pub fn add_element(&mut self, element: GraphElement) -> GraphResult<EdgeIndex> {
        if let Err(e) = self.validate_element(&element) {
            error!("Rejected graph element: {}", e);
            return Err(e);
        }

        let GraphElement { edge, new_vertices } = element;
        let index = self.edge_storage.next_index();
        let new_ids: BTreeSet<VertexId> = new_vertices.iter().map(|nv| nv.vertex.id).collect();

        for new_vertex in new_vertices {
            self.vertex_storage
                .add(new_vertex.vertex, new_vertex.cluster, new_vertex.timestamp)?;
        }
        for (vertex, timestamp) in edge.vertex_timestamps() {
            if !new_ids.contains(&vertex) {
                self.vertex_storage.add_vertex_timestamp(vertex, timestamp)?;
            }
            self.adjacency.entry(vertex).or_default().insert(index);
        }

        debug!("Added {} edge {} over {:?}", edge.kind(), index, edge.vertices());
        Ok(self.edge_storage.push(edge))
    }

    /// Remove a committed edge.
    ///
    /// Vertices left without edges are removed, and so are clusters left without vertices.
    pub fn remove_edge(&mut self, index: EdgeIndex) -> GraphResult<Edge> {
        match self.edge_storage.get(index) {
            Some(edge) if edge.index() == Some(index) => {}
            _ => {
                error!("Cannot remove edge {}: not stored", index);
                return Err(GraphError::EdgeNotFound(index));
            }
        }
        let edge = self
            .edge_storage
            .take(index)
            .ok_or(GraphError::EdgeNotFound(index))?;

        for (vertex, timestamp) in edge.vertex_timestamps() {
            if let Some(edges) = self.adjacency.get_mut(&vertex) {
                edges.remove(&index);
                if edges.is_empty() {
                    self.adjacency.remove(&vertex);
                }
            }
            self.vertex_storage.remove_vertex_timestamp(vertex, timestamp)?;
        }
        Ok(edge)
    }

    /// Replace a committed edge with a refined one, keeping its running index.
    ///
    /// The replacement must have the same kind and use the same vertices.
    pub fn replace_edge(&mut self, index: EdgeIndex, replacement: Edge) -> GraphResult<()> {
        let old = self
            .edge_storage
            .get(index)
            .ok_or(GraphError::EdgeNotFound(index))?;
        if let Some(committed) = replacement.index() {
            return Err(GraphError::EdgeAlreadyCommitted(committed));
        }
        if old.kind() != replacement.kind() {
            return Err(GraphError::KindMismatch {
                stored: old.kind(),
                replacement: replacement.kind(),
            });
        }
        let old_vertices: BTreeSet<VertexId> = old.vertices().iter().copied().collect();
        let new_vertices: BTreeSet<VertexId> = replacement.vertices().iter().copied().collect();
        if new_vertices.len() != replacement.vertices().len()
            || replacement.vertices().len() != old.vertices().len()
            || !new_vertices.is_subset(&old_vertices)
        {
            return Err(GraphError::NotSubset(index));
        }
        for (vertex, timestamp) in replacement.vertex_timestamps() {
            let cluster = self
                .vertex_storage
                .cluster_of(&vertex)
                .ok_or(GraphError::VertexNotFound(vertex))?;
            self.vertex_storage.check_timestamp(timestamp, cluster)?;
        }

        let old_uses: Vec<(VertexId, Timestamp)> = old.vertex_timestamps().collect();
        for (vertex, timestamp) in replacement.vertex_timestamps() {
            self.vertex_storage.add_vertex_timestamp(vertex, timestamp)?;
        }
        for (vertex, timestamp) in old_uses {
            self.vertex_storage.remove_vertex_timestamp(vertex, timestamp)?;
        }
        self.edge_storage
            .replace(index, replacement)
            .ok_or(GraphError::EdgeNotFound(index))?;
        Ok(())
    }

    /// Remove a vertex by removing every edge that touches it.
    pub fn remove_vertex(&mut self, vertex: VertexId) -> GraphResult<Vec<Edge>> {
        if !self.vertex_storage.contains(&vertex) {
            error!("Cannot remove vertex {}: not stored", vertex);
            return Err(GraphError::VertexNotFound(vertex));
        }
        let indices: Vec<EdgeIndex> = self
            .adjacency
            .get(&vertex)
            .map(|edges| edges.iter().copied().collect())
            .unwrap_or_default();

        let mut removed = Vec::with_capacity(indices.len());
        for index in indices.into_iter().rev() {
            removed.push(self.remove_edge(index)?);
        }
        if self.vertex_storage.contains(&vertex) {
            self.vertex_storage.remove(vertex)?;
        }
        Ok(removed)
    }

    /// Overwrite vertex values, e.g. with the output of a solver.
    ///
    /// All values are checked before any is written.
    pub fn update_vertices<I>(&mut self, values: I) -> GraphResult<()>
    where
        I: IntoIterator<Item = (VertexId, VertexValue)>,
    {
        let values: Vec<(VertexId, VertexValue)> = values.into_iter().collect();
        for (vertex, value) in &values {
            if !self.vertex_storage.contains(vertex) {
                return Err(GraphError::VertexNotFound(*vertex));
            }
            if value.kind() != vertex.kind {
                return Err(GraphError::ValueMismatch {
                    vertex: *vertex,
                    value: value.kind().to_string(),
                });
            }
        }
        for (vertex, value) in values {
            self.vertex_storage.set_value(vertex, value)?;
        }
        Ok(())
    }

    /// Values of an edge's vertices, in edge order.
    pub fn edge_values(&self, edge: &Edge) -> GraphResult<Vec<&VertexValue>> {
        edge.vertices()
            .iter()
            .map(|v| {
                self.vertex_storage
                    .get(v)
                    .map(|vertex| &vertex.value)
                    .ok_or(GraphError::VertexNotFound(*v))
            })
            .collect()
    }

    pub fn vertex_storage(&self) -> &VertexStorage {
        &self.vertex_storage
    }

    pub fn edge_storage(&self) -> &EdgeStorage {
        &self.edge_storage
    }

    pub fn vertex(&self, vertex: &VertexId) -> Option<&Vertex> {
        self.vertex_storage.get(vertex)
    }

    pub fn edge(&self, index: EdgeIndex) -> Option<&Edge> {
        self.edge_storage.get(index)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edge_storage.iter()
    }

    /// Edges touching `vertex`, in index order.
    pub fn adjacent_edges(&self, vertex: &VertexId) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.adjacency.get(vertex).into_iter().flatten().copied()
    }

    pub fn cluster_of(&self, vertex: &VertexId) -> Option<ClusterId> {
        self.vertex_storage.cluster_of(vertex)
    }

    pub fn next_edge_index(&self) -> EdgeIndex {
        self.edge_storage.next_index()
    }

    /// Allocation state to return to with [`Graph::rollback`].
    pub(crate) fn mark(&self) -> GraphMark {
        GraphMark {
            next_edge: self.edge_storage.next_index(),
            counters: self.vertex_storage.counters(),
        }
    }

    /// Release the edge indices and vertex counters handed out since `mark`.
    ///
    /// Every edge added after the mark must already be removed.
    pub(crate) fn rollback(&mut self, mark: GraphMark) -> GraphResult<()> {
        if !self.edge_storage.truncate(mark.next_edge) {
            error!("Cannot roll back to edge {}: later edges are still stored", mark.next_edge);
            return Err(GraphError::RollbackBlocked(mark.next_edge));
        }
        self.vertex_storage.restore_counters(mark.counters);
        Ok(())
    }

    pub fn num_vertices(&self) -> usize {
        self.vertex_storage.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_storage.is_empty() && self.edge_storage.is_empty()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let count = |kind| {
            self.vertex_storage
                .vertices()
                .filter(|v| v.id.kind == kind)
                .count()
        };
        GraphStatistics {
            num_vertices: self.vertex_storage.len(),
            num_poses: count(VertexKind::Pose),
            num_velocities: count(VertexKind::Velocity),
            num_biases: count(VertexKind::ImuBias),
            num_edges: self.edge_storage.len(),
            num_clusters: self.vertex_storage.num_clusters(),
            next_edge_index: self.edge_storage.next_index().0,
        }
    }

    /// Verify that storage and adjacency agree.
    ///
    /// Every stored edge's vertices are stored and list the edge in their adjacency,
    /// every adjacency entry is non-empty and points at live edges using the vertex, and
    /// every stored vertex has at least one edge.
    pub fn check_consistency(&self) -> GraphResult<()> {
        for edge in self.edge_storage.iter() {
            let index = edge
                .index()
                .ok_or_else(|| GraphError::InvalidElement("Stored edge has no index".to_string()))?;
            for vertex in edge.vertices() {
                if !self.vertex_storage.contains(vertex) {
                    return Err(GraphError::VertexNotFound(*vertex));
                }
                if !self
                    .adjacency
                    .get(vertex)
                    .is_some_and(|edges| edges.contains(&index))
                {
                    return Err(GraphError::InvalidElement(format!(
                        "Edge {index} is missing from the adjacency of {vertex}"
                    )));
                }
            }
        }
        for (vertex, edges) in &self.adjacency {
            if edges.is_empty() {
                return Err(GraphError::InvalidElement(format!(
                    "Vertex {vertex} has an empty adjacency entry"
                )));
            }
            for index in edges {
                let edge = self
                    .edge_storage
                    .get(*index)
                    .ok_or(GraphError::EdgeNotFound(*index))?;
                if !edge.vertices().contains(vertex) {
                    return Err(GraphError::InvalidElement(format!(
                        "Edge {index} does not use {vertex}"
                    )));
                }
            }
        }
        for vertex in self.vertex_storage.vertices() {
            if !self.adjacency.contains_key(&vertex.id) {
                return Err(GraphError::InvalidElement(format!(
                    "Vertex {} has no edges",
                    vertex.id
                )));
            }
        }
        Ok(())
    }

    fn validate_element(&self, element: &GraphElement) -> GraphResult<()> {
        let edge = &element.edge;
        if let Some(index) = edge.index() {
            return Err(GraphError::EdgeAlreadyCommitted(index));
        }
        if edge.vertices().len() != edge.kind().arity() {
            return Err(GraphError::InvalidElement(format!(
                "{} edge needs {} vertices, got {}",
                edge.kind(),
                edge.kind().arity(),
                edge.vertices().len()
            )));
        }
        let distinct: BTreeSet<VertexId> = edge.vertices().iter().copied().collect();
        if distinct.len() != edge.vertices().len() {
            return Err(GraphError::InvalidElement(format!(
                "{} edge uses a vertex twice",
                edge.kind()
            )));
        }

        let edge_uses: BTreeMap<VertexId, Timestamp> = edge.vertex_timestamps().collect();
        let mut pending: BTreeMap<Timestamp, ClusterId> = BTreeMap::new();
        let mut claim = |timestamp: Timestamp, cluster: ClusterId| -> GraphResult<()> {
            self.vertex_storage.check_timestamp(timestamp, cluster)?;
            match pending.insert(timestamp, cluster) {
                Some(existing) if existing != cluster => Err(GraphError::TimestampTaken {
                    timestamp,
                    existing,
                }),
                _ => Ok(()),
            }
        };

        let mut new_ids = BTreeSet::new();
        for new_vertex in &element.new_vertices {
            let id = new_vertex.vertex.id;
            if !new_ids.insert(id) || self.vertex_storage.contains(&id) {
                return Err(GraphError::VertexExists(id));
            }
            if edge_uses.get(&id) != Some(&new_vertex.timestamp) {
                return Err(GraphError::InvalidElement(format!(
                    "New vertex {} is not used by the edge at timestamp {}",
                    id, new_vertex.timestamp
                )));
            }
            claim(new_vertex.timestamp, new_vertex.cluster)?;
        }
        for (vertex, timestamp) in edge.vertex_timestamps() {
            if new_ids.contains(&vertex) {
                continue;
            }
            let cluster = self
                .vertex_storage
                .cluster_of(&vertex)
                .ok_or(GraphError::VertexNotFound(vertex))?;
            claim(timestamp, cluster)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::{BetweenFactor, GpsFactor};
    use crate::graph::{EdgeKind, NewVertex};
    use crate::measurement::{MeasurementId, MeasurementKey};
    use nalgebra::{Isometry3, Vector3};
    use std::sync::Arc;

    fn new_pose(index: usize, cluster: usize, timestamp: Timestamp) -> NewVertex {
        NewVertex {
            vertex: Vertex::identity(VertexId::pose(index)),
            cluster: ClusterId(cluster),
            timestamp,
        }
    }

    fn gps(pose: usize, timestamp: Timestamp) -> Edge {
        Edge::new(
            EdgeKind::Gps,
            vec![(VertexId::pose(pose), timestamp)],
            Arc::new(GpsFactor::new(Vector3::zeros())),
            MeasurementKey::Sensor(MeasurementId(pose as u64)),
        )
    }

    fn odometry(from: (usize, Timestamp), to: (usize, Timestamp)) -> Edge {
        Edge::new(
            EdgeKind::PoseOdometry,
            vec![(VertexId::pose(from.0), from.1), (VertexId::pose(to.0), to.1)],
            Arc::new(BetweenFactor::new(Isometry3::identity())),
            MeasurementKey::Sensor(MeasurementId(100)),
        )
    }

    #[test]
    fn test_add_element_assigns_running_index() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        let first = graph.add_element(GraphElement::new(gps(0, 1), vec![new_pose(0, 0, 1)]))?;
        let second = graph.add_element(GraphElement::new(gps(0, 1), vec![]))?;

        assert_eq!((first, second), (EdgeIndex(0), EdgeIndex(1)));
        assert_eq!(graph.adjacent_edges(&VertexId::pose(0)).count(), 2);
        graph.check_consistency()?;
        Ok(())
    }

    #[test]
    fn test_add_element_is_atomic() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(GraphElement::new(gps(0, 1), vec![new_pose(0, 0, 1)]))?;

        let bad = GraphElement::new(
            odometry((0, 1), (1, 1)),
            vec![new_pose(1, 1, 1)],
        );
        assert!(matches!(
            graph.add_element(bad),
            Err(GraphError::TimestampTaken { .. })
        ));
        assert_eq!(graph.num_vertices(), 1);
        assert_eq!(graph.next_edge_index(), EdgeIndex(1));
        graph.check_consistency()?;
        Ok(())
    }

    #[test]
    fn test_add_element_rejects_unknown_vertex() {
        let mut graph = Graph::new();
        let result = graph.add_element(GraphElement::new(gps(3, 1), vec![]));
        assert_eq!(result, Err(GraphError::VertexNotFound(VertexId::pose(3))));
    }

    #[test]
    fn test_remove_edge_cascades_to_vertices_and_clusters() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(GraphElement::new(
            odometry((0, 1), (1, 2)),
            vec![new_pose(0, 0, 1), new_pose(1, 1, 2)],
        ))?;

        graph.remove_edge(EdgeIndex(0))?;
        assert!(graph.is_empty());
        assert_eq!(graph.vertex_storage().num_clusters(), 0);
        assert!(matches!(
            graph.remove_edge(EdgeIndex(0)),
            Err(GraphError::EdgeNotFound(EdgeIndex(0)))
        ));
        Ok(())
    }

    #[test]
    fn test_rollback_releases_trial_indices() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(GraphElement::new(gps(0, 1), vec![new_pose(0, 0, 1)]))?;
        let mark = graph.mark();

        let trial = graph.add_element(GraphElement::new(
            odometry((0, 1), (1, 2)),
            vec![new_pose(1, 1, 2)],
        ))?;
        assert!(matches!(
            graph.rollback(mark.clone()),
            Err(GraphError::RollbackBlocked(EdgeIndex(1)))
        ));
        graph.remove_edge(trial)?;
        graph.rollback(mark)?;

        assert_eq!(graph.next_edge_index(), EdgeIndex(1));
        assert_eq!(graph.vertex_storage().next_index(VertexKind::Pose), 1);
        assert_eq!(graph.vertex_storage().next_cluster_id(), ClusterId(1));
        let again = graph.add_element(GraphElement::new(
            odometry((0, 1), (1, 2)),
            vec![new_pose(1, 1, 2)],
        ))?;
        assert_eq!(again, trial);
        graph.check_consistency()?;
        Ok(())
    }

    #[test]
    fn test_replace_edge_keeps_index() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        let index = graph.add_element(GraphElement::new(
            odometry((0, 1), (1, 2)),
            vec![new_pose(0, 0, 1), new_pose(1, 1, 2)],
        ))?;

        graph.replace_edge(index, odometry((0, 1), (1, 2)))?;
        assert_eq!(graph.edge(index).and_then(Edge::index), Some(index));
        assert_eq!(graph.num_edges(), 1);
        graph.check_consistency()?;
        Ok(())
    }

    #[test]
    fn test_replace_edge_rejects_topology_change() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        let index = graph.add_element(GraphElement::new(
            odometry((0, 1), (1, 2)),
            vec![new_pose(0, 0, 1), new_pose(1, 1, 2)],
        ))?;
        graph.add_element(GraphElement::new(gps(2, 3), vec![new_pose(2, 2, 3)]))?;

        assert!(matches!(
            graph.replace_edge(index, gps(0, 1)),
            Err(GraphError::KindMismatch { .. })
        ));
        assert_eq!(
            graph.replace_edge(index, odometry((0, 1), (2, 3))),
            Err(GraphError::NotSubset(index))
        );
        Ok(())
    }

    #[test]
    fn test_remove_vertex_cascades() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(GraphElement::new(gps(0, 1), vec![new_pose(0, 0, 1)]))?;
        graph.add_element(GraphElement::new(
            odometry((0, 1), (1, 2)),
            vec![new_pose(1, 1, 2)],
        ))?;

        let removed = graph.remove_vertex(VertexId::pose(0))?;
        assert_eq!(removed.len(), 2);
        assert!(graph.is_empty());
        assert!(graph.remove_vertex(VertexId::pose(0)).is_err());
        Ok(())
    }

    #[test]
    fn test_update_vertices_validates_first() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(GraphElement::new(gps(0, 1), vec![new_pose(0, 0, 1)]))?;

        let moved = VertexValue::Pose(Isometry3::translation(1.0, 0.0, 0.0));
        let result = graph.update_vertices([
            (VertexId::pose(0), moved.clone()),
            (VertexId::pose(9), moved.clone()),
        ]);
        assert!(result.is_err());
        assert_eq!(
            graph.vertex(&VertexId::pose(0)).map(|v| &v.value),
            Some(&VertexValue::identity(VertexKind::Pose))
        );

        graph.update_vertices([(VertexId::pose(0), moved.clone())])?;
        assert_eq!(graph.vertex(&VertexId::pose(0)).map(|v| &v.value), Some(&moved));
        Ok(())
    }

    #[test]
    fn test_statistics_display() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(GraphElement::new(gps(0, 1), vec![new_pose(0, 0, 1)]))?;

        let stats = graph.statistics();
        assert_eq!(stats.num_poses, 1);
        assert_eq!(stats.num_edges, 1);
        assert!(stats.to_string().contains("Edges: 1"));
        Ok(())
    }
}
