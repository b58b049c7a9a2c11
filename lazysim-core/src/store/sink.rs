//! Positioned Sinks
//!
//! [`SinkStore`] turns any container that can write and read rows at a
//! given position into a [`Store`]. One sink is created per operation
//! identity when its first chunk is written.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use super::{Store, StoredCallback};
use crate::array::{Array, Shape};
use crate::error::{Error, Result};
use crate::operation::{OperationId, TaskKey};

/// A container addressed by sample position.
///
/// Reading rows that were written must return exactly the written values.
pub trait SliceSink: Send + Sync + fmt::Debug {
    fn write_rows(&self, start: usize, data: &Array) -> Result<()>;
    fn read_rows(&self, range: Range<usize>) -> Result<Array>;
}

/// Store backed by one sink per operation identity.
pub struct SinkStore<S: SliceSink> {
    sinks: DashMap<OperationId, Arc<S>>,
    factory: Box<dyn Fn(&OperationId) -> S + Send + Sync>,
}

impl<S: SliceSink> SinkStore<S> {
    /// `factory` creates the sink for an identity on its first write.
    pub fn new(factory: impl Fn(&OperationId) -> S + Send + Sync + 'static) -> Self {
        Self {
            sinks: DashMap::new(),
            factory: Box::new(factory),
        }
    }

    pub fn sink(&self, node: &OperationId) -> Option<Arc<S>> {
        self.sinks.get(node).map(|sink| Arc::clone(&sink))
    }

    fn sink_for(&self, node: &OperationId) -> Arc<S> {
        let sink = self
            .sinks
            .entry(node.clone())
            .or_insert_with(|| Arc::new((self.factory)(node)));
        Arc::clone(&sink)
    }
}

impl<S: SliceSink> fmt::Debug for SinkStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkStore")
            .field("sinks", &self.sinks)
            .finish_non_exhaustive()
    }
}

impl<S: SliceSink + 'static> Store for SinkStore<S> {
    fn write(&self, key: TaskKey, data: Array, on_done: StoredCallback) -> Result<()> {
        let written = self.sink_for(&key.node).write_rows(key.start, &data);
        on_done(&key, written)
    }

    fn read(&self, node: &OperationId, range: Range<usize>) -> Result<Array> {
        self.sink(node)
            .ok_or_else(|| Error::Store(format!("no sink for {}", node)))?
            .read_rows(range)
    }

    fn reset(&self, node: &OperationId) -> Result<()> {
        self.sinks.remove(node);
        Ok(())
    }
}

#[derive(Debug)]
struct Buffer {
    values: Vec<f64>,
    written: Vec<bool>,
}

/// Fixed-capacity sink holding `capacity` samples of one row shape.
#[derive(Debug)]
pub struct Preallocated {
    capacity: usize,
    row_shape: Shape,
    buffer: RwLock<Buffer>,
}

impl Preallocated {
    pub fn new(capacity: usize, row_shape: &[usize]) -> Self {
        let row_len: usize = row_shape.iter().product();
        Self {
            capacity,
            row_shape: Shape::from_slice(row_shape),
            buffer: RwLock::new(Buffer {
                values: vec![0.0; capacity * row_len],
                written: vec![false; capacity],
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn row_len(&self) -> usize {
        self.row_shape.iter().product()
    }
}

impl SliceSink for Preallocated {
    fn write_rows(&self, start: usize, data: &Array) -> Result<()> {
        if data.shape().get(1..) != Some(&self.row_shape[..]) {
            return Err(Error::Store(format!(
                "rows of shape {:?} do not fit a sink of row shape {:?}",
                data.shape(),
                self.row_shape
            )));
        }
        let stop = start + data.nrows();
        if stop > self.capacity {
            return Err(Error::Store(format!(
                "rows {}..{} exceed capacity {}",
                start, stop, self.capacity
            )));
        }

        let width = self.row_len();
        let mut buffer = self.buffer.write();
        buffer.values[start * width..stop * width].copy_from_slice(data.values());
        buffer.written[start..stop].fill(true);
        Ok(())
    }

    fn read_rows(&self, range: Range<usize>) -> Result<Array> {
        if range.start > range.end || range.end > self.capacity {
            return Err(Error::Store(format!(
                "rows {:?} out of range for capacity {}",
                range, self.capacity
            )));
        }

        let buffer = self.buffer.read();
        if !buffer.written[range.clone()].iter().all(|&w| w) {
            return Err(Error::Store(format!("rows {:?} were not written", range)));
        }
        let width = self.row_len();
        let mut shape = Shape::from_slice(&[range.len()]);
        shape.extend_from_slice(&self.row_shape);
        Array::new(&shape, buffer.values[range.start * width..range.end * width].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preallocated_round_trip() {
        let sink = Preallocated::new(4, &[2]);
        let rows = Array::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        sink.write_rows(1, &rows).unwrap();
        assert_eq!(sink.read_rows(1..3).unwrap(), rows);
        assert!(sink.read_rows(0..2).is_err());
    }

    #[test]
    fn preallocated_rejects_overflow_and_bad_shape() {
        let sink = Preallocated::new(2, &[1]);
        assert!(sink.write_rows(1, &Array::column(vec![1.0, 2.0])).is_err());
        let wide = Array::from_rows(vec![vec![1.0, 2.0]]).unwrap();
        assert!(sink.write_rows(0, &wide).is_err());
    }

    #[test]
    fn sink_store_creates_one_sink_per_identity() {
        let store = SinkStore::new(|_: &OperationId| Preallocated::new(8, &[1]));
        let node = OperationId::new("g", "x", 0);
        let key = TaskKey::new(node.clone(), 0..2);
        store
            .write(key, Array::column(vec![5.0, 6.0]), Box::new(|_, result| result))
            .unwrap();

        assert_eq!(store.read(&node, 1..2).unwrap().values(), &[6.0]);
        store.reset(&node).unwrap();
        assert!(store.sink(&node).is_none());
        assert!(store.read(&node, 0..1).is_err());
    }
}
