//! Graph isolation for candidate materialization.
//!
//! A candidate is built in a workspace graph and discarded once it is scored.
//! [`CopiedGraph`] works on a private deep copy and hands the copy back on discard.
//! [`LiveGraph`] works on the committed graph itself and undoes every added edge and
//! every value update on discard, leaving the graph as it was. The edge indices and
//! vertex counters the candidate used are released as well, so the next candidate
//! starts from the same allocation state.

use tracing::error;

use crate::error::FusionResult;
use crate::graph::store::GraphMark;
use crate::graph::{EdgeIndex, Graph, VertexId, VertexValue};

pub trait GraphIsolation {
    /// Graph the candidate is materialized into.
    fn workspace(&mut self) -> &mut Graph;

    /// Release the workspace after the candidate was scored.
    ///
    /// `added` lists the edges the candidate added, in insertion order. Returns the
    /// candidate's own graph when the strategy keeps one.
    fn discard(self, added: &[EdgeIndex]) -> FusionResult<Option<Graph>>;
}

/// Copy-per-candidate isolation.
#[derive(Debug, Clone)]
pub struct CopiedGraph {
    graph: Graph,
}

impl CopiedGraph {
    pub fn new(committed: &Graph) -> Self {
        Self {
            graph: committed.clone(),
        }
    }
}

impl GraphIsolation for CopiedGraph {
    fn workspace(&mut self) -> &mut Graph {
        &mut self.graph
    }

    fn discard(self, _added: &[EdgeIndex]) -> FusionResult<Option<Graph>> {
        Ok(Some(self.graph))
    }
}

/// Mutate-and-undo isolation over the committed graph.
#[derive(Debug)]
pub struct LiveGraph<'a> {
    graph: &'a mut Graph,
    snapshot: Vec<(VertexId, VertexValue)>,
    mark: GraphMark,
}

impl<'a> LiveGraph<'a> {
    /// Record the current vertex values and allocation state so they can be restored.
    pub fn new(graph: &'a mut Graph) -> Self {
        let snapshot = graph
            .vertex_storage()
            .vertices()
            .map(|v| (v.id, v.value.clone()))
            .collect();
        let mark = graph.mark();
        Self {
            graph,
            snapshot,
            mark,
        }
    }
}

impl GraphIsolation for LiveGraph<'_> {
    fn workspace(&mut self) -> &mut Graph {
        &mut *self.graph
    }

    fn discard(self, added: &[EdgeIndex]) -> FusionResult<Option<Graph>> {
        for &index in added.iter().rev() {
            if let Err(e) = self.graph.remove_edge(index) {
                error!("Failed to undo edge {}: {}", index, e);
                return Err(e.into());
            }
        }
        self.graph.rollback(self.mark)?;
        self.graph.update_vertices(self.snapshot)?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::PosePriorFactor;
    use crate::graph::{ClusterId, Edge, EdgeKind, GraphElement, NewVertex, Vertex, VertexKind};
    use crate::measurement::{MeasurementId, MeasurementKey};
    use nalgebra::Isometry3;
    use std::sync::Arc;

    fn prior_element(index: usize, timestamp: i64) -> GraphElement {
        let id = VertexId::pose(index);
        let edge = Edge::new(
            EdgeKind::Prior,
            vec![(id, timestamp)],
            Arc::new(PosePriorFactor::new(Isometry3::identity())),
            MeasurementKey::Sensor(MeasurementId(index as u64)),
        );
        GraphElement::new(
            edge,
            vec![NewVertex {
                vertex: Vertex::identity(id),
                cluster: ClusterId(index),
                timestamp,
            }],
        )
    }

    #[test]
    fn test_copy_leaves_committed_graph_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let mut committed = Graph::new();
        committed.add_element(prior_element(0, 1))?;

        let mut isolation = CopiedGraph::new(&committed);
        let index = isolation.workspace().add_element(prior_element(1, 2))?;
        let copy = isolation.discard(&[index])?;

        assert_eq!(committed.num_edges(), 1);
        assert_eq!(copy.map(|g| g.num_edges()), Some(2));
        Ok(())
    }

    #[test]
    fn test_live_graph_is_restored() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_element(prior_element(0, 1))?;
        let before = graph.statistics();

        let mut isolation = LiveGraph::new(&mut graph);
        let workspace = isolation.workspace();
        let index = workspace.add_element(prior_element(1, 2))?;
        workspace.update_vertices([(
            VertexId::pose(0),
            VertexValue::Pose(Isometry3::translation(3.0, 0.0, 0.0)),
        )])?;
        assert!(isolation.discard(&[index])?.is_none());

        let after = graph.statistics();
        assert_eq!(after.num_vertices, before.num_vertices);
        assert_eq!(after.num_edges, before.num_edges);
        assert_eq!(after.num_clusters, before.num_clusters);
        assert_eq!(after.next_edge_index, before.next_edge_index);
        assert_eq!(graph.vertex_storage().next_index(VertexKind::Pose), 1);
        assert_eq!(
            graph.vertex(&VertexId::pose(0)).map(|v| v.value.clone()),
            Some(VertexValue::Pose(Isometry3::identity()))
        );
        graph.check_consistency()?;
        Ok(())
    }
}
