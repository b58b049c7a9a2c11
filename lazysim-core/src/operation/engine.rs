//! Lazy-Slice Engine
//!
//! Data generation on the graph. Asking a node for a range of samples asks
//! its parents for the same range first, then builds one task for the part
//! of the range the node has not produced yet and appends it to the node's
//! cache. Ranges that were produced before are served from the cache.
//!
//! ```text
//! acquire(n) ──► generate(missing) ──► get_slice(batch) ──► parents' get_slice
//!                                            │
//!                                            └─► Task ─► executor.accept ─► cache.append
//! ```
//!
//! Appends happen at the tail only. Callers must not run two generating
//! calls on the same node at the same time; `&mut Graph` enforces this.

use std::ops::Range;
use std::sync::Arc;

use indexmap::IndexMap;

use super::task::check_batch;
use super::{
    Chunk, Deferred, InputRecord, ObservedSource, Operation, OperationId, OperationSpec,
    OutputCache, Substream, Task, TaskKey,
};
use crate::array::Array;
use crate::error::{Error, Result};
use crate::graph::{Graph, Node, NodeId};
use crate::ops::Constant;

/// Literal data to use instead of running a node's transform, by node name.
pub type WithValues = IndexMap<String, Array>;

impl Graph {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Register an operation named `name` reading from `parents`.
    ///
    /// Fails before anything is registered if a parent is missing, the number
    /// of parents does not match the kind, or an inherited observed value
    /// cannot be computed.
    pub fn add_operation(
        &mut self,
        name: impl Into<String>,
        parents: &[NodeId],
        spec: impl Into<OperationSpec>,
    ) -> Result<NodeId> {
        let name = name.into();
        let spec = spec.into();
        for &parent in parents {
            self.node(parent)?;
        }
        if let Some(expected) = spec.arity {
            if parents.len() != expected {
                return Err(Error::Arity {
                    node: name,
                    expected,
                    actual: parents.len(),
                });
            }
        }

        let observed = self.initial_observed(&name, parents, &spec)?;
        let store = spec.store.clone().or_else(|| self.default_store.clone());
        let version = self.fresh_version(None, &name, 0);
        let cache = OutputCache::new(OperationId::new(self.name(), name.as_str(), version), store);
        let mut operation = Operation::new(spec, observed, cache);
        operation.version = version;

        let id = self.add_node(Node::with_operation(name, operation));
        self.add_parents(id, parents)?;
        Ok(id)
    }

    /// Create a constant node holding `value` and link it as a parent of
    /// `child`, at `index` or at the end.
    pub fn add_constant_parent(
        &mut self,
        child: NodeId,
        value: impl Into<Array>,
        index: Option<usize>,
    ) -> Result<NodeId> {
        let owner = self.node(child)?.name().to_string();
        let name = self.implicit_name(&owner);
        let constant = self.add_operation(name, &[], Constant::new(value))?;
        if let Err(err) = self.add_parent_at(child, constant, index, None) {
            self.remove_node(constant)?;
            return Err(err);
        }
        Ok(constant)
    }

    fn initial_observed(
        &self,
        name: &str,
        parents: &[NodeId],
        spec: &OperationSpec,
    ) -> Result<Option<Array>> {
        match &spec.observed {
            ObservedSource::None => Ok(None),
            ObservedSource::Given(value) => Ok(Some(value.clone().normalize(1))),
            ObservedSource::Inherit => {
                if parents.is_empty() {
                    return Err(Error::MissingObserved(name.to_string()));
                }
                let data = self.parent_observed(parents)?;
                let record = InputRecord {
                    observed: spec.observed_inputs.then(|| data.clone()),
                    data,
                    n: 1,
                    index: 0,
                    random_state: spec
                        .randomness
                        .then(|| Substream::new(self.seed(), self.new_substream_index())),
                };
                let output = spec.transform.apply(&record)?;
                check_batch(name, &output.data, 1, spec.columns)?;
                Ok(Some(output.data))
            }
        }
    }

    fn parent_observed(&self, parents: &[NodeId]) -> Result<Vec<Array>> {
        parents
            .iter()
            .map(|&parent| {
                let node = self.node(parent)?;
                node.operation()
                    .and_then(Operation::observed)
                    .cloned()
                    .ok_or_else(|| Error::MissingObserved(node.name().to_string()))
            })
            .collect()
    }

    /// Smallest version at or above `floor` that no other operation named
    /// `name` in this graph is using.
    fn fresh_version(&self, except: Option<NodeId>, name: &str, floor: u64) -> u64 {
        self.nodes
            .values()
            .filter(|node| Some(node.id()) != except)
            .filter_map(Node::operation)
            .filter(|op| op.id().node == name)
            .map(|op| op.version + 1)
            .fold(floor, u64::max)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn operation(&self, id: NodeId) -> Result<&Operation> {
        self.node(id)?.operation().ok_or(Error::NotAnOperation(id))
    }

    fn operation_mut(&mut self, id: NodeId) -> Result<&mut Operation> {
        self.node_mut(id)?
            .operation_mut()
            .ok_or(Error::NotAnOperation(id))
    }

    /// Number of samples handed out by [`generate`](Self::generate).
    pub fn generated_len(&self, id: NodeId) -> Result<usize> {
        Ok(self.operation(id)?.generated)
    }

    pub fn version(&self, id: NodeId) -> Result<u64> {
        Ok(self.operation(id)?.version)
    }

    pub fn operation_id(&self, id: NodeId) -> Result<OperationId> {
        Ok(self.operation(id)?.id().clone())
    }

    pub fn observed(&self, id: NodeId) -> Result<Option<&Array>> {
        Ok(self.operation(id)?.observed())
    }

    pub fn cache(&self, id: NodeId) -> Result<&OutputCache> {
        Ok(&self.operation(id)?.cache)
    }

    /// Realize a handle with the graph's executor.
    pub fn compute(&self, data: &Deferred) -> Result<Array> {
        self.executor.compute(data)
    }

    // -------------------------------------------------------------------------
    // Generation
    // -------------------------------------------------------------------------

    /// Samples `[starting, starting + n)` of a node, generating forward in
    /// batches of `batch_size` if that range has not been generated yet.
    pub fn acquire(
        &mut self,
        id: NodeId,
        n: usize,
        starting: usize,
        batch_size: Option<usize>,
    ) -> Result<Deferred> {
        let stop = end_of(starting, n)?;
        let generated = self.operation(id)?.generated;
        if stop > generated {
            self.generate(id, stop - generated, batch_size, None)?;
        }
        self.get_slice(id, starting..stop, None)
    }

    /// Generate the next `n` samples of a node in batches of `batch_size`.
    ///
    /// Each entry of `with_values` holds `n` samples (or a form that
    /// broadcasts to `n`) for the named node; for this call that node skips
    /// its transform and yields the given data instead. Samples that were
    /// already produced by an earlier `get_slice` keep their data.
    pub fn generate(
        &mut self,
        id: NodeId,
        n: usize,
        batch_size: Option<usize>,
        with_values: Option<&WithValues>,
    ) -> Result<Deferred> {
        let batch_size = match batch_size {
            Some(0) => return Err(Error::InvalidBatchSize),
            Some(size) => size,
            None => n.max(1),
        };
        let values = with_values.map(|values| normalize_values(values, n));

        let start = self.operation(id)?.generated;
        let stop = end_of(start, n)?;
        loop {
            let len = self.operation(id)?.cache.len();
            if len >= stop {
                break;
            }
            let batch = batch_size.min(stop - len);
            let offset = len - start;
            let batch_values = match &values {
                Some(values) => Some(slice_values(values, offset..offset + batch)?),
                None => None,
            };
            self.slice_aligned(id, len..len + batch, batch_values.as_ref())?;
        }

        let operation = self.operation_mut(id)?;
        operation.generated = stop;
        Ok(operation.cache.read(start..stop))
    }

    /// Samples in `range` of a node.
    ///
    /// If the node has not produced up to `range.end` yet, the missing tail
    /// is requested from every parent and one new chunk covering it is
    /// appended. Otherwise the data comes from existing chunks only.
    ///
    /// Each entry of `with_values` holds the samples of `range` (or a form
    /// that broadcasts to its length) for the named node. Samples of `range`
    /// that already exist keep their data.
    pub fn get_slice(
        &mut self,
        id: NodeId,
        range: Range<usize>,
        with_values: Option<&WithValues>,
    ) -> Result<Deferred> {
        let values = with_values.map(|values| normalize_values(values, range.len()));
        self.slice_aligned(id, range, values.as_ref())
    }

    /// [`get_slice`](Self::get_slice) with overrides already holding exactly
    /// one row per sample of `range`.
    fn slice_aligned(
        &mut self,
        id: NodeId,
        range: Range<usize>,
        with_values: Option<&WithValues>,
    ) -> Result<Deferred> {
        let len = self.operation(id)?.cache.len();
        if len >= range.end {
            tracing::trace!(node = %id, start = range.start, stop = range.end, "served from cache");
            return Ok(self.operation(id)?.cache.read(range));
        }

        // Overrides cover `range` only; samples before it are computed.
        if with_values.is_some() && len < range.start {
            self.slice_aligned(id, len..range.start, None)?;
        }
        let start = self.operation(id)?.cache.len();
        if start < range.end {
            let values = match with_values {
                Some(values) => Some(slice_values(
                    values,
                    start - range.start..range.end - range.start,
                )?),
                None => None,
            };
            let chunk = self.build_chunk(id, start..range.end, values.as_ref())?;
            let executor = Arc::clone(&self.executor);
            self.operation_mut(id)?.cache.append(chunk, &executor)?;
        }
        Ok(self.operation(id)?.cache.read(range))
    }

    fn build_chunk(
        &mut self,
        id: NodeId,
        range: Range<usize>,
        with_values: Option<&WithValues>,
    ) -> Result<Chunk> {
        let node = self.node(id)?;
        let name = node.name().to_string();
        let parents = node.parents().to_vec();

        let mut inputs = Vec::with_capacity(parents.len());
        for &parent in &parents {
            inputs.push(self.slice_aligned(parent, range.clone(), with_values)?);
        }

        let operation = self.operation(id)?;
        let key = TaskKey::new(operation.id().clone(), range.clone());

        if let Some(value) = with_values.and_then(|values| values.get(&name)) {
            let data = value.clone();
            check_batch(&name, &data, range.len(), operation.columns)?;
            return Ok(Chunk {
                data: Deferred::Literal {
                    key: key.clone(),
                    data: Arc::new(data),
                },
                key,
            });
        }

        let random_state = operation
            .randomness
            .then(|| Substream::new(self.seed(), self.new_substream_index()));
        let observed = if operation.observed_inputs {
            Some(self.parent_observed(&parents)?)
        } else {
            None
        };
        let task = Arc::new(Task::new(
            key.clone(),
            Arc::clone(&operation.transform),
            inputs,
            random_state,
            observed,
            operation.columns,
        ));

        self.executor.accept(&task)?;
        tracing::debug!(task = %key, "accepted task");
        Ok(Chunk {
            key,
            data: Deferred::Task(task),
        })
    }

    // -------------------------------------------------------------------------
    // Reset
    // -------------------------------------------------------------------------

    /// Forget everything a node has generated.
    ///
    /// The node gets a new version and therefore a new identity; its cache
    /// and any stored chunks of the old identity are dropped. With
    /// `propagate`, every descendant is reset as well. Structural nodes are
    /// left alone.
    pub fn reset(&mut self, id: NodeId, propagate: bool) -> Result<()> {
        if propagate {
            for descendant in self.descendants(id)? {
                self.reset_operation(descendant)?;
            }
        }
        self.reset_operation(id)
    }

    fn reset_operation(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let Some(current) = node.operation().map(|op| op.version) else {
            return Ok(());
        };
        let name = node.name().to_string();
        let version = self.fresh_version(Some(id), &name, current + 1);
        let new_id = OperationId::new(self.name(), name, version);
        let executor = Arc::clone(&self.executor);

        let operation = self.operation_mut(id)?;
        let old = operation.id().clone();
        operation.cache.reset(new_id)?;
        operation.generated = 0;
        operation.version = version;
        executor.release(&old);
        tracing::debug!(from = %old, to = %operation.id(), "reset operation");
        Ok(())
    }
}

fn end_of(start: usize, n: usize) -> Result<usize> {
    start.checked_add(n).ok_or(Error::RangeOverflow { start, n })
}

fn normalize_values(values: &WithValues, n: usize) -> WithValues {
    values
        .iter()
        .map(|(name, value)| (name.clone(), value.clone().normalize(n)))
        .collect()
}

fn slice_values(values: &WithValues, rows: Range<usize>) -> Result<WithValues> {
    values
        .iter()
        .map(|(name, value)| Ok((name.clone(), value.rows(rows.clone())?)))
        .collect()
}
