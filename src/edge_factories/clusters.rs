//! Candidate-local vertex cluster table.
//!
//! Every measurement cluster of a candidate is given a vertex-cluster handle up front.
//! Edge factories resolve `(kind, timestamp)` pairs against the graph first and this table
//! second, and only create a vertex when neither holds one.

use std::collections::BTreeMap;

use crate::error::FusionResult;
use crate::graph::{ClusterId, Graph, NewVertex, Vertex, VertexId, VertexKind, VertexValue};
use crate::measurement::{MeasurementCluster, TimeRange, Timestamp};

#[derive(Debug, Clone)]
pub struct CandidateClusters {
    entries: Vec<(ClusterId, TimeRange)>,
    next_cluster: usize,
    next_index: BTreeMap<VertexKind, usize>,
    search_threshold: Timestamp,
}

impl CandidateClusters {
    /// Assign a fresh handle to each measurement cluster with core content.
    pub fn new(
        graph: &Graph,
        clusters: &[MeasurementCluster],
        search_threshold: Timestamp,
    ) -> FusionResult<Self> {
        let mut table = Self {
            entries: Vec::with_capacity(clusters.len()),
            next_cluster: graph.vertex_storage().next_cluster_id().0,
            next_index: BTreeMap::new(),
            search_threshold,
        };
        for cluster in clusters.iter().filter(|c| c.has_core()) {
            let range = cluster.time_range()?;
            table.push(range);
        }
        Ok(table)
    }

    pub fn entries(&self) -> &[(ClusterId, TimeRange)] {
        &self.entries
    }

    /// Local handle whose range covers `timestamp`.
    pub fn cluster_for(&self, timestamp: Timestamp) -> Option<ClusterId> {
        self.entries
            .iter()
            .find(|(_, range)| range.contains(timestamp))
            .map(|(id, _)| *id)
    }

    fn push(&mut self, range: TimeRange) -> ClusterId {
        let id = ClusterId(self.next_cluster);
        self.next_cluster += 1;
        self.entries.push((id, range));
        id
    }

    fn next_vertex_id(&mut self, graph: &Graph, kind: VertexKind) -> VertexId {
        let next = self.next_index.entry(kind).or_insert(0);
        let index = (*next).max(graph.vertex_storage().next_index(kind));
        *next = index + 1;
        VertexId::new(kind, index)
    }

    /// Find or create the vertex of `kind` at `timestamp`.
    ///
    /// Lookup order: the cluster owning or covering `timestamp` in the graph, then the
    /// local cluster covering it, then the nearest vertex of `kind` within the search
    /// threshold. A missing vertex is created with `initial` and appended to `pending`.
    pub fn resolve<F>(
        &mut self,
        graph: &Graph,
        pending: &mut Vec<NewVertex>,
        kind: VertexKind,
        timestamp: Timestamp,
        initial: F,
    ) -> VertexId
    where
        F: FnOnce() -> VertexValue,
    {
        let storage = graph.vertex_storage();
        let cluster = storage
            .get_cluster(timestamp)
            .or_else(|| self.cluster_for(timestamp));

        match cluster {
            Some(id) => {
                let created = pending
                    .iter()
                    .rev()
                    .find(|nv| nv.cluster == id && nv.vertex.id.kind == kind)
                    .map(|nv| nv.vertex.id);
                let stored = || {
                    storage
                        .cluster(id)
                        .and_then(|c| c.vertices_of_kind(kind).last())
                };
                if let Some(vertex) = created.or_else(stored) {
                    return vertex;
                }
            }
            None => {
                if let Some(vertex) = storage.nearest_vertex(kind, timestamp, self.search_threshold) {
                    return vertex;
                }
            }
        }

        let cluster = match cluster {
            Some(id) => id,
            None => self.push(TimeRange::instant(timestamp)),
        };
        let id = self.next_vertex_id(graph, kind);
        pending.push(NewVertex {
            vertex: Vertex {
                id,
                value: initial(),
            },
            cluster,
            timestamp,
        });
        id
    }
}

/// Current value of `vertex`, looking at the vertices about to be created first.
pub fn value_of(graph: &Graph, pending: &[NewVertex], vertex: VertexId) -> Option<VertexValue> {
    pending
        .iter()
        .find(|nv| nv.vertex.id == vertex)
        .map(|nv| nv.vertex.value.clone())
        .or_else(|| graph.vertex(&vertex).map(|v| v.value.clone()))
}
