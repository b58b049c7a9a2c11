//! Error Types
//!
//! Every fallible operation in the crate reports one of these variants.
//! Structural failures leave the graph untouched, cache failures are raised
//! before any mutation, and contract violations in user functions abort the
//! append of the offending chunk.

use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised by the graph, the lazy-slice engine, caches and stores.
#[derive(Debug, Error)]
pub enum Error {
    /// The node is not registered in the graph.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// No node is registered under the given name.
    #[error("no node named `{0}`")]
    UnknownName(String),

    /// Linking the nodes would make the graph cyclic.
    #[error("adding {parent} as a parent of {child} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },

    /// An insertion or removal index is outside of the adjacency list.
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The given node is not a parent of the child.
    #[error("{parent} is not a parent of {child}")]
    ParentNotFound { child: NodeId, parent: NodeId },

    /// Another node already holds the name.
    #[error("name `{0}` is already taken")]
    NameTaken(String),

    /// The node carries no operation and cannot generate data.
    #[error("node {0} is not an operation")]
    NotAnOperation(NodeId),

    /// A chunk did not start where the cache currently ends.
    #[error("chunk starting at {start} does not continue a cache of length {len}")]
    Contiguity { start: usize, len: usize },

    /// A store completion could not be matched to exactly one chunk.
    #[error("expected exactly one chunk with key {key}, found {matches}")]
    ChunkLookup { key: String, matches: usize },

    /// A user function returned data of the wrong shape.
    #[error("shape contract violated by `{node}`: expected ({expected}, ...) with at least 2 dimensions, got {actual:?}")]
    ShapeContract {
        node: String,
        expected: usize,
        actual: Vec<usize>,
    },

    /// An array could not be built or combined.
    #[error("invalid array: {0}")]
    InvalidArray(String),

    /// An observed exemplar was required but is not available.
    #[error("`{0}` has no observed value")]
    MissingObserved(String),

    /// A node kind was given the wrong number of parents.
    #[error("`{node}` expects {expected} parent(s), got {actual}")]
    Arity {
        node: String,
        expected: usize,
        actual: usize,
    },

    /// A requested sample range does not fit in `usize`.
    #[error("{n} samples starting at {start} overflow the sample index")]
    RangeOverflow { start: usize, n: usize },

    /// Batches must contain at least one sample.
    #[error("batch size must be positive")]
    InvalidBatchSize,

    /// The store identifier in a configuration is not recognised.
    #[error("unknown store identifier `{0}`")]
    UnknownStore(String),

    /// A backing store failed to persist or return data.
    #[error("store error: {0}")]
    Store(String),

    /// An asynchronous task was cancelled or panicked.
    #[error("task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),

    #[error(transparent)]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
