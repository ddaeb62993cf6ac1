//! Solver seam for candidate evaluation.
//!
//! The candidate factory calls [`Solver::solve`] once per candidate and writes the
//! returned values back through [`Graph::update_vertices`]. [`EvaluationSolver`] is the
//! built-in backend: it scores the graph at its current values without iterating.

use std::fmt;

use rayon::prelude::*;

use crate::error::{FusionError, FusionResult};
use crate::graph::{Edge, Graph, VertexId, VertexValue};

/// Values and residual produced by a solver run.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutput {
    /// Updated vertex values
    pub values: Vec<(VertexId, VertexValue)>,
    /// Total information-weighted squared error
    pub residual: f64,
}

pub trait Solver: fmt::Debug + Send + Sync {
    fn solve(&self, graph: &Graph) -> FusionResult<SolverOutput>;
}

/// Sum of `r^T Ω r` over every edge, at the current vertex values.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationSolver;

impl EvaluationSolver {
    pub fn edge_error(graph: &Graph, edge: &Edge) -> FusionResult<f64> {
        let values = graph.edge_values(edge)?;
        edge.factor().weighted_error(&values)
    }
}

impl Solver for EvaluationSolver {
    fn solve(&self, graph: &Graph) -> FusionResult<SolverOutput> {
        let edges: Vec<&Edge> = graph.edges().collect();
        let residual = edges
            .par_iter()
            .map(|edge| Self::edge_error(graph, edge))
            .collect::<FusionResult<Vec<f64>>>()?
            .into_iter()
            .sum::<f64>();
        if !residual.is_finite() {
            return Err(FusionError::Solver(format!(
                "Residual is not finite: {residual}"
            )));
        }

        let values = graph
            .vertex_storage()
            .vertices()
            .map(|v| (v.id, v.value.clone()))
            .collect();
        Ok(SolverOutput { values, residual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factors::PosePriorFactor;
    use crate::graph::{ClusterId, EdgeKind, GraphElement, NewVertex, Vertex};
    use crate::measurement::{MeasurementId, MeasurementKey};
    use nalgebra::Isometry3;
    use std::sync::Arc;

    fn prior(graph: &mut Graph, index: usize, timestamp: i64, measured: Isometry3<f64>) -> FusionResult<()> {
        let id = VertexId::pose(index);
        let edge = Edge::new(
            EdgeKind::Prior,
            vec![(id, timestamp)],
            Arc::new(PosePriorFactor::new(measured)),
            MeasurementKey::Sensor(MeasurementId(index as u64)),
        );
        let vertex = NewVertex {
            vertex: Vertex::identity(id),
            cluster: ClusterId(index),
            timestamp,
        };
        graph.add_element(GraphElement::new(edge, vec![vertex]))?;
        Ok(())
    }

    #[test]
    fn test_empty_graph_has_zero_residual() -> Result<(), Box<dyn std::error::Error>> {
        let output = EvaluationSolver.solve(&Graph::new())?;
        assert_eq!(output.residual, 0.0);
        assert!(output.values.is_empty());
        Ok(())
    }

    #[test]
    fn test_residual_sums_edges() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        prior(&mut graph, 0, 1, Isometry3::translation(1.0, 0.0, 0.0))?;
        prior(&mut graph, 1, 2, Isometry3::translation(0.0, 2.0, 0.0))?;

        let output = EvaluationSolver.solve(&graph)?;

        assert!((output.residual - 5.0).abs() < 1e-12);
        assert_eq!(output.values.len(), 2);
        Ok(())
    }
}
