//! Edges, edge storage and graph elements.

use std::fmt;
use std::sync::Arc;

use crate::factors::Factor;
use crate::graph::{ClusterId, Vertex, VertexId};
use crate::measurement::{MeasurementKey, Timestamp};

/// Running index of a committed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeIndex(pub usize);

impl fmt::Display for EdgeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of an edge. Replacements must keep the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Prior,
    Gps,
    PoseOdometry,
    ImuOdometry,
}

impl EdgeKind {
    /// Number of vertices an edge of this kind connects.
    pub fn arity(&self) -> usize {
        match self {
            EdgeKind::Prior | EdgeKind::Gps => 1,
            EdgeKind::PoseOdometry => 2,
            EdgeKind::ImuOdometry => 5,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EdgeKind::Prior => "Prior",
            EdgeKind::Gps => "Gps",
            EdgeKind::PoseOdometry => "PoseOdometry",
            EdgeKind::ImuOdometry => "ImuOdometry",
        };
        write!(f, "{name}")
    }
}

/// One constraint tying vertices together.
///
/// Each vertex is used at one timestamp; the pair is what the vertex storage
/// reference-counts. The index stays `None` until the edge is committed.
#[derive(Debug, Clone)]
pub struct Edge {
    kind: EdgeKind,
    vertices: Vec<VertexId>,
    timestamps: Vec<Timestamp>,
    factor: Arc<dyn Factor>,
    measurement: MeasurementKey,
    index: Option<EdgeIndex>,
}

impl Edge {
    pub fn new(
        kind: EdgeKind,
        vertices: Vec<(VertexId, Timestamp)>,
        factor: Arc<dyn Factor>,
        measurement: MeasurementKey,
    ) -> Self {
        let (vertices, timestamps) = vertices.into_iter().unzip();
        Self {
            kind,
            vertices,
            timestamps,
            factor,
            measurement,
            index: None,
        }
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    /// Vertices paired with the timestamp each is used at.
    pub fn vertex_timestamps(&self) -> impl Iterator<Item = (VertexId, Timestamp)> + '_ {
        self.vertices
            .iter()
            .copied()
            .zip(self.timestamps.iter().copied())
    }

    pub fn factor(&self) -> &Arc<dyn Factor> {
        &self.factor
    }

    /// Key of the measurement the edge was created from.
    pub fn measurement(&self) -> MeasurementKey {
        self.measurement
    }

    pub fn index(&self) -> Option<EdgeIndex> {
        self.index
    }

    pub(crate) fn set_index(&mut self, index: EdgeIndex) {
        self.index = Some(index);
    }
}

/// A vertex an element introduces, with the cluster and timestamp it belongs to.
#[derive(Debug, Clone)]
pub struct NewVertex {
    pub vertex: Vertex,
    pub cluster: ClusterId,
    pub timestamp: Timestamp,
}

/// One edge plus the vertices it creates, applied atomically to a graph.
#[derive(Debug, Clone)]
pub struct GraphElement {
    pub edge: Edge,
    pub new_vertices: Vec<NewVertex>,
}

impl GraphElement {
    pub fn new(edge: Edge, new_vertices: Vec<NewVertex>) -> Self {
        Self { edge, new_vertices }
    }
}

/// Slot-based edge store. Removed edges leave an empty slot behind so running
/// indices are never recycled.
#[derive(Debug, Clone, Default)]
pub struct EdgeStorage {
    slots: Vec<Option<Edge>>,
    live: usize,
}

impl EdgeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next committed edge receives.
    pub fn next_index(&self) -> EdgeIndex {
        EdgeIndex(self.slots.len())
    }

    pub(crate) fn push(&mut self, mut edge: Edge) -> EdgeIndex {
        let index = self.next_index();
        edge.set_index(index);
        self.slots.push(Some(edge));
        self.live += 1;
        index
    }

    pub fn get(&self, index: EdgeIndex) -> Option<&Edge> {
        self.slots.get(index.0).and_then(Option::as_ref)
    }

    pub(crate) fn take(&mut self, index: EdgeIndex) -> Option<Edge> {
        let edge = self.slots.get_mut(index.0)?.take()?;
        self.live -= 1;
        Some(edge)
    }

    pub(crate) fn replace(&mut self, index: EdgeIndex, mut edge: Edge) -> Option<Edge> {
        let slot = self.slots.get_mut(index.0)?;
        let old = slot.take()?;
        edge.set_index(index);
        *slot = Some(edge);
        Some(old)
    }

    /// Drop the empty slots from `next` onward so `next` is handed out again.
    ///
    /// Returns `false` and leaves the store untouched if any of those slots still
    /// holds an edge.
    pub(crate) fn truncate(&mut self, next: EdgeIndex) -> bool {
        match self.slots.get(next.0..) {
            Some(tail) if tail.iter().all(Option::is_none) => {
                self.slots.truncate(next.0);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn contains(&self, index: EdgeIndex) -> bool {
        self.get(index).is_some()
    }

    /// Live edges in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
