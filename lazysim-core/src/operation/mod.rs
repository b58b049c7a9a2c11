//! Operations
//!
//! An operation is a node that generates data. It wraps a batched
//! [`Transform`] and keeps everything needed to produce its output lazily:
//! how many samples have been generated, an append-only [`OutputCache`] of
//! the chunks produced so far, and a version counter bumped on every reset.
//!
//! # Identity
//!
//! Chunks are keyed by [`OperationId`], built from the graph name, the node
//! name and the version. A reset bumps the version, so chunks produced before
//! the reset live in a namespace nothing refers to anymore.
//!
//! # Capabilities
//!
//! Capabilities are chosen when the operation is built, through
//! [`OperationSpec`]:
//!
//! - randomness: every chunk receives its own [`Substream`];
//! - observed value: a single-row exemplar, given or computed by running the
//!   transform on the parents' exemplars;
//! - observed inputs: the parents' exemplars are passed to the transform
//!   alongside each batch.

mod cache;
mod engine;
mod substream;
mod task;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::store::Store;

pub use cache::{Chunk, OutputCache};
pub use engine::WithValues;
pub use substream::Substream;
pub use task::{
    Deferred, InputRecord, InputRef, OutputRecord, Task, TaskDescription, TaskKey, Transform,
};

/// Identity of one version of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId {
    pub graph: String,
    pub node: String,
    pub version: u64,
}

impl OperationId {
    pub fn new(graph: impl Into<String>, node: impl Into<String>, version: u64) -> Self {
        Self {
            graph: graph.into(),
            node: node.into(),
            version,
        }
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.v{}", self.graph, self.node, self.version)
    }
}

/// Where an operation's observed exemplar comes from.
#[derive(Debug, Clone, Default)]
pub enum ObservedSource {
    /// The operation has no observed exemplar.
    #[default]
    None,
    /// Use this value, normalized to a single row.
    Given(Array),
    /// Run the transform once on the parents' exemplars.
    Inherit,
}

/// Everything needed to turn a node into an operation.
///
/// Leaf kinds in [`crate::ops`] convert into a spec; arbitrary transforms go
/// through [`OperationSpec::new`].
#[derive(Clone)]
pub struct OperationSpec {
    pub(crate) kind: &'static str,
    pub(crate) transform: Arc<dyn Transform>,
    pub(crate) randomness: bool,
    pub(crate) observed: ObservedSource,
    pub(crate) observed_inputs: bool,
    pub(crate) store: Option<Arc<dyn Store>>,
    pub(crate) arity: Option<usize>,
    pub(crate) columns: Option<usize>,
}

impl OperationSpec {
    pub fn new(transform: impl Transform + 'static) -> Self {
        Self {
            kind: "operation",
            transform: Arc::new(transform),
            randomness: false,
            observed: ObservedSource::None,
            observed_inputs: false,
            store: None,
            arity: None,
            columns: None,
        }
    }

    pub(crate) fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = kind;
        self
    }

    /// Give every chunk its own random sub-stream.
    pub fn with_randomness(mut self) -> Self {
        self.randomness = true;
        self
    }

    pub fn with_observed(mut self, observed: impl Into<Array>) -> Self {
        self.observed = ObservedSource::Given(observed.into());
        self
    }

    /// Compute the observed exemplar from the parents' exemplars.
    pub fn inherit_observed(mut self) -> Self {
        self.observed = ObservedSource::Inherit;
        self
    }

    /// Pass the parents' observed exemplars to the transform.
    pub fn with_observed_inputs(mut self) -> Self {
        self.observed_inputs = true;
        self
    }

    /// Persist chunks in `store` instead of the graph's default store.
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Require exactly `parents` parents.
    pub fn with_arity(mut self, parents: usize) -> Self {
        self.arity = Some(parents);
        self
    }

    /// Require every output sample to hold exactly `columns` values.
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = Some(columns);
        self
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("kind", &self.kind)
            .field("randomness", &self.randomness)
            .field("observed", &self.observed)
            .field("observed_inputs", &self.observed_inputs)
            .field("arity", &self.arity)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// Data-generating state attached to a node.
pub struct Operation {
    kind: &'static str,
    pub(crate) transform: Arc<dyn Transform>,
    pub(crate) randomness: bool,
    pub(crate) observed_inputs: bool,
    pub(crate) columns: Option<usize>,
    observed: Option<Array>,

    /// Number of samples handed out by `generate`.
    pub(crate) generated: usize,

    /// Number of resets so far.
    pub(crate) version: u64,

    pub(crate) cache: OutputCache,
}

impl Operation {
    pub(crate) fn new(spec: OperationSpec, observed: Option<Array>, cache: OutputCache) -> Self {
        Self {
            kind: spec.kind,
            transform: spec.transform,
            randomness: spec.randomness,
            observed_inputs: spec.observed_inputs,
            columns: spec.columns,
            observed,
            generated: 0,
            version: 0,
            cache,
        }
    }

    /// Name of the leaf kind this operation was built from.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn id(&self) -> &OperationId {
        self.cache.node_id()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn generated(&self) -> usize {
        self.generated
    }

    pub fn observed(&self) -> Option<&Array> {
        self.observed.as_ref()
    }

    pub fn has_randomness(&self) -> bool {
        self.randomness
    }

    pub fn cache(&self) -> &OutputCache {
        &self.cache
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("kind", &self.kind)
            .field("id", self.id())
            .field("generated", &self.generated)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_display() {
        assert_eq!(OperationId::new("g", "sim", 3).to_string(), "g.sim.v3");
    }

    #[test]
    fn versions_give_distinct_identities() {
        assert_ne!(OperationId::new("g", "a", 0), OperationId::new("g", "a", 1));
    }
}
