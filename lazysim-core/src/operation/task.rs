//! Computation Descriptions
//!
//! Generating a chunk never runs user code directly. Instead the engine
//! builds a [`Task`] describing the computation (its cache key, the deferred
//! parent data it reads, and the attachment values) and wraps it in a
//! [`Deferred`] handle. Executors turn handles into arrays.
//!
//! Tasks are keyed by the identity of their operation and the sample range
//! they cover, so an executor can memoize results by key and two requests for
//! the same range of the same node version share one computation.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::substream::Substream;
use super::OperationId;
use crate::array::Array;
use crate::error::{Error, Result};
use crate::store::Store;

/// Cache key of one chunk: the operation identity plus a half-open range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey {
    pub node: OperationId,
    pub start: usize,
    pub stop: usize,
}

impl TaskKey {
    pub fn new(node: OperationId, range: Range<usize>) -> Self {
        Self {
            node,
            start: range.start,
            stop: range.end,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.stop
    }

    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.node, self.start, self.stop)
    }
}

/// What a transformation receives for one batch.
#[derive(Debug, Clone)]
pub struct InputRecord {
    /// One batch per parent, in parent order.
    pub data: Vec<Array>,
    /// Number of samples in the batch.
    pub n: usize,
    /// Index of the first sample of the batch.
    pub index: usize,
    /// Sub-stream for stochastic operations.
    pub random_state: Option<Substream>,
    /// Observed exemplars of the parents, for discrepancies.
    pub observed: Option<Vec<Array>>,
}

/// What a transformation returns for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub data: Array,
}

impl From<Array> for OutputRecord {
    fn from(data: Array) -> Self {
        Self { data }
    }
}

/// A batched transformation from parent data to node data.
pub trait Transform: Send + Sync {
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord>;
}

impl<F> Transform for F
where
    F: Fn(&InputRecord) -> Result<OutputRecord> + Send + Sync,
{
    fn apply(&self, input: &InputRecord) -> Result<OutputRecord> {
        self(input)
    }
}

/// One pending computation of a chunk.
pub struct Task {
    key: TaskKey,
    transform: Arc<dyn Transform>,
    inputs: Vec<Deferred>,
    n: usize,
    index: usize,
    random_state: Option<Substream>,
    observed: Option<Vec<Array>>,
    /// Required trailing width, for kinds that promise one column.
    columns: Option<usize>,
    /// Store holding the result once the chunk has been persisted.
    persisted: OnceLock<Arc<dyn Store>>,
}

impl Task {
    pub(crate) fn new(
        key: TaskKey,
        transform: Arc<dyn Transform>,
        inputs: Vec<Deferred>,
        random_state: Option<Substream>,
        observed: Option<Vec<Array>>,
        columns: Option<usize>,
    ) -> Self {
        Self {
            n: key.len(),
            index: key.start,
            key,
            transform,
            inputs,
            random_state,
            observed,
            columns,
            persisted: OnceLock::new(),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// Deferred parent data, in parent order.
    pub fn inputs(&self) -> &[Deferred] {
        &self.inputs
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn random_state(&self) -> Option<Substream> {
        self.random_state
    }

    /// Store the result was written to, if any. Executors read from it
    /// instead of running the task again.
    pub fn persisted(&self) -> Option<&Arc<dyn Store>> {
        self.persisted.get()
    }

    pub(crate) fn persisted_in(&self, store: Arc<dyn Store>) {
        let _ = self.persisted.set(store);
    }

    /// Run the transformation on realized parent data and check the result.
    pub fn run(&self, data: Vec<Array>) -> Result<Array> {
        let record = InputRecord {
            data,
            n: self.n,
            index: self.index,
            random_state: self.random_state,
            observed: self.observed.clone(),
        };
        let output = self.transform.apply(&record)?;
        check_batch(&self.key.node.node, &output.data, self.n, self.columns)?;
        Ok(output.data)
    }

    /// A serializable description of this task.
    pub fn describe(&self) -> TaskDescription {
        TaskDescription {
            key: self.key.clone(),
            inputs: self.inputs.iter().map(Deferred::describe).collect(),
            n: self.n,
            index: self.index,
            substream: self.random_state,
            observed: self.observed.is_some(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("key", &self.key)
            .field("inputs", &self.inputs.len())
            .field("random_state", &self.random_state)
            .field("persisted", &self.persisted.get().is_some())
            .finish_non_exhaustive()
    }
}

/// Enforce the batch contract: leading dimension `n`, at least two axes and,
/// when requested, exactly `columns` values per sample.
pub(crate) fn check_batch(node: &str, data: &Array, n: usize, columns: Option<usize>) -> Result<()> {
    let width_ok = match columns {
        Some(width) => data.shape().get(1..) == Some(&[width][..]),
        None => true,
    };
    if data.ndim() < 2 || data.nrows() != n || !width_ok {
        return Err(Error::ShapeContract {
            node: node.to_string(),
            expected: n,
            actual: data.shape().to_vec(),
        });
    }
    Ok(())
}

/// A lazy handle to node data.
#[derive(Debug, Clone)]
pub enum Deferred {
    /// Output of a computation.
    Task(Arc<Task>),
    /// Data supplied by the caller in place of a computation.
    Literal { key: TaskKey, data: Arc<Array> },
    /// A chunk that has been persisted and is read back from its store.
    Stored { key: TaskKey, store: Arc<dyn Store> },
    /// A row range of another handle, relative to its first row.
    Rows { source: Box<Deferred>, rows: Range<usize> },
    /// Handles concatenated along the sample axis.
    Concat(Vec<Deferred>),
    /// No samples.
    Empty,
}

impl Deferred {
    /// Cache key of the chunk behind this handle, if it is a whole chunk.
    pub fn key(&self) -> Option<&TaskKey> {
        match self {
            Self::Task(task) => Some(task.key()),
            Self::Literal { key, .. } | Self::Stored { key, .. } => Some(key),
            Self::Rows { .. } | Self::Concat(_) | Self::Empty => None,
        }
    }

    pub fn describe(&self) -> InputRef {
        match self {
            Self::Task(task) => InputRef::Task {
                key: task.key().clone(),
            },
            Self::Literal { key, .. } => InputRef::Literal { key: key.clone() },
            Self::Stored { key, .. } => InputRef::Stored { key: key.clone() },
            Self::Rows { source, rows } => InputRef::Rows {
                source: Box::new(source.describe()),
                start: rows.start,
                stop: rows.end,
            },
            Self::Concat(parts) => InputRef::Concat {
                parts: parts.iter().map(Self::describe).collect(),
            },
            Self::Empty => InputRef::Empty,
        }
    }
}

/// Serializable form of a [`Deferred`] input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputRef {
    Task { key: TaskKey },
    Literal { key: TaskKey },
    Stored { key: TaskKey },
    Rows { source: Box<InputRef>, start: usize, stop: usize },
    Concat { parts: Vec<InputRef> },
    Empty,
}

/// Serializable description of a [`Task`]: what to run and on what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub key: TaskKey,
    pub inputs: Vec<InputRef>,
    pub n: usize,
    pub index: usize,
    pub substream: Option<Substream>,
    pub observed: bool,
}

impl TaskDescription {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(start: usize, stop: usize) -> TaskKey {
        TaskKey::new(OperationId::new("g", "x", 0), start..stop)
    }

    fn doubling() -> Arc<dyn Transform> {
        Arc::new(|input: &InputRecord| -> Result<OutputRecord> {
            Ok(input.data[0].map(|v| v * 2.0).into())
        })
    }

    #[test]
    fn task_key_display() {
        assert_eq!(key(2, 5).to_string(), "g.x.v0[2:5]");
        assert_eq!(key(2, 5).len(), 3);
    }

    #[test]
    fn run_applies_transform() {
        let task = Task::new(key(0, 2), doubling(), Vec::new(), None, None, None);
        let out = task.run(vec![Array::column(vec![1.0, 2.0])]).unwrap();
        assert_eq!(out.values(), &[2.0, 4.0]);
    }

    #[test]
    fn run_rejects_wrong_row_count() {
        let task = Task::new(key(0, 3), doubling(), Vec::new(), None, None, None);
        let err = task.run(vec![Array::column(vec![1.0, 2.0])]).unwrap_err();
        assert!(matches!(err, Error::ShapeContract { expected: 3, .. }));
    }

    #[test]
    fn run_rejects_one_dimensional_output() {
        let task = Task::new(key(0, 2), doubling(), Vec::new(), None, None, None);
        assert!(task.run(vec![Array::vector(vec![1.0, 2.0])]).is_err());
    }

    #[test]
    fn column_contract() {
        let wide = Array::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        assert!(check_batch("d", &wide, 1, Some(1)).is_err());
        assert!(check_batch("d", &Array::column(vec![1.0]), 1, Some(1)).is_ok());
    }

    #[test]
    fn description_round_trips_through_json() {
        let literal = Deferred::Literal {
            key: key(0, 2),
            data: Arc::new(Array::column(vec![1.0, 2.0])),
        };
        let input = Deferred::Rows {
            source: Box::new(literal),
            rows: 1..2,
        };
        let task = Task::new(
            key(1, 2),
            doubling(),
            vec![input],
            Some(Substream::new(7, 3)),
            None,
            None,
        );
        let description = task.describe();
        let json = description.to_json().unwrap();
        assert!(json.contains("\"kind\":\"rows\""));
        assert_eq!(TaskDescription::from_json(&json).unwrap(), description);
    }
}
