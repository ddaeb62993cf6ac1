//! Error type for the graph store.

use thiserror::Error;

use crate::graph::{ClusterId, EdgeIndex, EdgeKind, VertexId};
use crate::measurement::Timestamp;

/// Result type for graph store operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Invariant violations reported by the graph store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Vertex {0} already exists")]
    VertexExists(VertexId),

    #[error("Vertex {0} does not exist")]
    VertexNotFound(VertexId),

    #[error("Timestamp {timestamp} is already taken by cluster {existing}")]
    TimestampTaken {
        timestamp: Timestamp,
        existing: ClusterId,
    },

    #[error("Vertex {vertex} is not registered at timestamp {timestamp}")]
    TimestampNotFound { vertex: VertexId, timestamp: Timestamp },

    #[error("Cluster {0} does not exist")]
    ClusterNotFound(ClusterId),

    #[error("Edge {0} does not exist")]
    EdgeNotFound(EdgeIndex),

    #[error("Edge {0} is already committed")]
    EdgeAlreadyCommitted(EdgeIndex),

    #[error("Cannot roll back to edge {0}: later edges are still stored")]
    RollbackBlocked(EdgeIndex),

    #[error("Edge kind mismatch: stored {stored}, replacement {replacement}")]
    KindMismatch {
        stored: EdgeKind,
        replacement: EdgeKind,
    },

    #[error("Replacement for edge {0} does not use the same vertices")]
    NotSubset(EdgeIndex),

    #[error("Invalid graph element: {0}")]
    InvalidElement(String),

    #[error("Vertex {vertex} cannot hold a value of kind {value}")]
    ValueMismatch { vertex: VertexId, value: String },
}
