//! Vertex/edge graph store
//!
//! The committed estimation graph is an arena: vertices, clusters and edges live in
//! owning tables and refer to each other through stable handles ([`VertexId`],
//! [`ClusterId`], [`EdgeIndex`]). Cloning a [`Graph`] therefore copies index tables and
//! shares factors through `Arc`, which keeps copy-per-candidate isolation cheap.

pub mod cluster;
pub mod edge;
pub mod error;
pub mod storage;
pub mod store;
pub mod vertex;

pub use cluster::{ClusterId, VertexCluster};
pub use edge::{Edge, EdgeIndex, EdgeKind, EdgeStorage, GraphElement, NewVertex};
pub use error::{GraphError, GraphResult};
pub use storage::VertexStorage;
pub use store::{Graph, GraphStatistics};
pub use vertex::{Vertex, VertexId, VertexKind, VertexValue};
