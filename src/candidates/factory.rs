//! Candidate materialization and evaluation.
//!
//! Every variant is materialized into an isolated workspace graph by dispatching its
//! measurements, cluster by cluster, to the edge factories. The workspace is then solved
//! and scored, and the isolation is discarded. Under copy-per-candidate the variants are
//! independent and run on the rayon pool.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::candidates::isolation::{CopiedGraph, GraphIsolation, LiveGraph};
use crate::candidates::leftovers::ClustersWithLeftovers;
use crate::candidates::variants::VariantsFactory;
use crate::config::{CandidateConfig, IsolationStrategy};
use crate::edge_factories::{CandidateClusters, EdgeFactoryRegistry};
use crate::error::FusionResult;
use crate::graph::{EdgeIndex, Graph, GraphElement, VertexId};
use crate::measurement::{ImuSample, Measurement, MeasurementCluster};
use crate::metrics::{CandidateMetrics, CandidateScore, Metrics, MetricsReport};
use crate::solver::{EvaluationSolver, Solver, SolverOutput};

/// One complete hypothesis for extending the graph with a batch.
#[derive(Debug, Clone)]
pub struct GraphCandidate {
    /// The candidate's own graph under copy-per-candidate, `None` under mutate-and-undo
    pub graph: Option<Graph>,
    /// Applied elements in application order, without edge indices
    pub elements: Vec<GraphElement>,
    /// Indices the elements received in the workspace graph
    pub new_edges: Vec<EdgeIndex>,
    pub new_vertices: BTreeSet<VertexId>,
    pub clusters: Vec<MeasurementCluster>,
    pub leftovers: Vec<ImuSample>,
    /// Measurements that could not form an edge
    pub skipped: usize,
}

impl GraphCandidate {
    pub(crate) fn new(item: ClustersWithLeftovers) -> Self {
        Self {
            graph: None,
            elements: Vec::new(),
            new_edges: Vec::new(),
            new_vertices: BTreeSet::new(),
            clusters: item.clusters,
            leftovers: item.leftovers,
            skipped: 0,
        }
    }
}

/// A candidate with its solver output and score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: GraphCandidate,
    pub solution: SolverOutput,
    pub metrics: MetricsReport,
    pub score: CandidateScore,
}

/// Every scored candidate of a batch.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<ScoredCandidate>,
    /// Measurements held back by the group limit
    pub deferred: Vec<Measurement>,
    /// Variants dropped because building them violated an invariant
    pub dropped: usize,
}

impl fmt::Display for CandidateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connected = self
            .candidates
            .iter()
            .filter(|c| c.score.connected)
            .count();
        write!(
            f,
            "{} candidates ({} connected, {} dropped, {} deferred measurements)",
            self.candidates.len(),
            connected,
            self.dropped,
            self.deferred.len()
        )
    }
}

#[derive(Debug, Clone)]
pub struct CandidateFactory {
    config: CandidateConfig,
    variants: VariantsFactory,
    registry: EdgeFactoryRegistry,
    solver: Arc<dyn Solver>,
    metrics: Arc<dyn Metrics>,
}

impl Default for CandidateFactory {
    fn default() -> Self {
        Self::new(CandidateConfig::default())
    }
}

impl CandidateFactory {
    /// Factory with the default edge factories, the evaluation solver and the
    /// built-in metrics.
    pub fn new(config: CandidateConfig) -> Self {
        Self {
            variants: VariantsFactory::new(config.clone()),
            config,
            registry: EdgeFactoryRegistry::with_defaults(),
            solver: Arc::new(EvaluationSolver),
            metrics: Arc::new(CandidateMetrics),
        }
    }

    pub fn with_registry(mut self, registry: EdgeFactoryRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_solver(mut self, solver: Arc<dyn Solver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &CandidateConfig {
        &self.config
    }

    pub fn registry(&self) -> &EdgeFactoryRegistry {
        &self.registry
    }

    /// Build and score every candidate for a batch.
    ///
    /// Under mutate-and-undo `graph` is used as the workspace and restored after every
    /// candidate; under copy-per-candidate it is only read.
    ///
    /// # Errors
    /// Propagates starvation, infeasible-topology and validation errors from variant
    /// creation, and failures to undo a candidate on the live graph. Invariant
    /// violations while building a single candidate only drop that candidate.
    pub fn build(&self, graph: &mut Graph, measurements: Vec<Measurement>) -> FusionResult<CandidateSet> {
        self.config.validate()?;
        let variants = self.variants.create(measurements)?;
        let total = variants.items.len();

        let results: Vec<(usize, FusionResult<ScoredCandidate>)> = match self.config.isolation {
            IsolationStrategy::CopyPerCandidate => {
                let committed: &Graph = graph;
                let evaluate = |(order, item): (usize, ClustersWithLeftovers)| {
                    self.evaluate(CopiedGraph::new(committed), item, order)
                        .map(|result| (order, result))
                };
                if self.config.runs_parallel() {
                    variants
                        .items
                        .into_par_iter()
                        .enumerate()
                        .map(evaluate)
                        .collect::<FusionResult<_>>()?
                } else {
                    variants
                        .items
                        .into_iter()
                        .enumerate()
                        .map(evaluate)
                        .collect::<FusionResult<_>>()?
                }
            }
            IsolationStrategy::MutateAndUndo => {
                let mut results = Vec::with_capacity(total);
                for (order, item) in variants.items.into_iter().enumerate() {
                    let result = self.evaluate(LiveGraph::new(graph), item, order)?;
                    results.push((order, result));
                }
                results
            }
        };

        let mut set = CandidateSet {
            deferred: variants.deferred,
            ..CandidateSet::default()
        };
        for (order, result) in results {
            match result {
                Ok(candidate) => set.candidates.push(candidate),
                Err(e) => {
                    warn!("Dropping candidate {}: {}", order, e);
                    set.dropped += 1;
                }
            }
        }
        debug!("Built {} of {} variants", set.candidates.len(), total);
        Ok(set)
    }

    /// Materialize and score one variant inside `isolation`.
    ///
    /// The outer error means the workspace could not be released and is fatal to the
    /// batch. The inner error only rejects this candidate.
    fn evaluate<I: GraphIsolation>(
        &self,
        mut isolation: I,
        item: ClustersWithLeftovers,
        order: usize,
    ) -> FusionResult<FusionResult<ScoredCandidate>> {
        let mut candidate = GraphCandidate::new(item);
        let scored = self.materialize_and_score(isolation.workspace(), &mut candidate, order);
        let graph = isolation.discard(&candidate.new_edges)?;
        Ok(scored.map(|(solution, metrics, score)| {
            candidate.graph = graph;
            ScoredCandidate {
                candidate,
                solution,
                metrics,
                score,
            }
        }))
    }

    fn materialize_and_score(
        &self,
        graph: &mut Graph,
        candidate: &mut GraphCandidate,
        order: usize,
    ) -> FusionResult<(SolverOutput, MetricsReport, CandidateScore)> {
        self.materialize(graph, candidate)?;

        let solution = self.solver.solve(graph)?;
        graph.update_vertices(solution.values.iter().cloned())?;
        let metrics = self.metrics.evaluate(graph, candidate)?;
        let score = CandidateScore {
            connected: metrics.connected,
            residual: solution.residual,
            time_shift: metrics.time_shift,
            num_leftovers: candidate.leftovers.len(),
            order,
        };
        debug!("Scored candidate {}", score);
        Ok((solution, metrics, score))
    }

    /// Apply the elements of every measurement, in cluster order, to `graph`.
    ///
    /// Skipped measurements are counted; any other error aborts the candidate. Edges
    /// added before the error stay recorded in `candidate.new_edges` so they can be undone.
    fn materialize(&self, graph: &mut Graph, candidate: &mut GraphCandidate) -> FusionResult<()> {
        let mut table = CandidateClusters::new(
            graph,
            &candidate.clusters,
            self.config.vertex_search_threshold,
        )?;

        for cluster in &candidate.clusters {
            for measurement in cluster.measurements() {
                let elements = match self.registry.create(graph, &mut table, &measurement) {
                    Ok(elements) => elements,
                    Err(e) if e.is_skip() => {
                        debug!("Skipping {}: {}", measurement, e);
                        candidate.skipped += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                for element in elements {
                    let new_vertices: Vec<VertexId> =
                        element.new_vertices.iter().map(|nv| nv.vertex.id).collect();
                    let index = graph.add_element(element.clone())?;
                    candidate.new_edges.push(index);
                    candidate.new_vertices.extend(new_vertices);
                    candidate.elements.push(element);
                }
            }
        }
        Ok(())
    }
}
