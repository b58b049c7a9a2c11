//! In-memory Store
//!
//! Keeps each persisted chunk as a MessagePack blob, grouped by operation
//! identity and ordered by first sample.

use std::collections::BTreeMap;
use std::ops::Range;

use dashmap::DashMap;

use super::{Store, StoredCallback};
use crate::array::Array;
use crate::error::{Error, Result};
use crate::operation::{OperationId, TaskKey};

/// Encoded chunks of one operation identity: first sample -> (stop, blob).
type Blobs = BTreeMap<usize, (usize, Vec<u8>)>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: DashMap<OperationId, Blobs>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks persisted for `node`.
    pub fn chunk_count(&self, node: &OperationId) -> usize {
        self.chunks.get(node).map_or(0, |blobs| blobs.len())
    }

    fn put(&self, key: &TaskKey, data: &Array) -> Result<()> {
        let blob = rmp_serde::to_vec(data)?;
        self.chunks
            .entry(key.node.clone())
            .or_default()
            .insert(key.start, (key.stop, blob));
        Ok(())
    }
}

impl Store for MemoryStore {
    fn write(&self, key: TaskKey, data: Array, on_done: StoredCallback) -> Result<()> {
        let written = self.put(&key, &data);
        on_done(&key, written)
    }

    fn read(&self, node: &OperationId, range: Range<usize>) -> Result<Array> {
        let blobs = self
            .chunks
            .get(node)
            .ok_or_else(|| Error::Store(format!("nothing stored for {}", node)))?;

        let mut parts = Vec::new();
        let mut covered = range.start;
        for (&start, (stop, blob)) in blobs.range(..range.end) {
            if *stop <= covered {
                continue;
            }
            if start > covered {
                break;
            }
            let array: Array = rmp_serde::from_slice(blob)?;
            let upto = range.end.min(*stop);
            parts.push(array.rows(covered - start..upto - start)?);
            covered = upto;
        }

        if covered < range.end {
            return Err(Error::Store(format!(
                "{} has no stored samples in {}..{}",
                node, covered, range.end
            )));
        }
        Array::vstack(&parts)
    }

    fn reset(&self, node: &OperationId) -> Result<()> {
        self.chunks.remove(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn node() -> OperationId {
        OperationId::new("g", "x", 0)
    }

    fn write(store: &MemoryStore, range: Range<usize>, first: f64) {
        let key = TaskKey::new(node(), range.clone());
        let values = (0..range.len()).map(|i| first + i as f64).collect();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        store
            .write(
                key,
                Array::column(values),
                Box::new(move |_, result| {
                    flag.store(true, Ordering::SeqCst);
                    result
                }),
            )
            .unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn read_spans_chunks() {
        let store = MemoryStore::new();
        write(&store, 0..3, 0.0);
        write(&store, 3..5, 3.0);
        assert_eq!(store.chunk_count(&node()), 2);

        let out = store.read(&node(), 1..5).unwrap();
        assert_eq!(out.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(store.read(&node(), 3..4).unwrap().values(), &[3.0]);
    }

    #[test]
    fn read_fails_on_missing_samples() {
        let store = MemoryStore::new();
        write(&store, 0..2, 0.0);
        assert!(matches!(store.read(&node(), 0..3), Err(Error::Store(_))));
        assert!(store.read(&OperationId::new("g", "y", 0), 0..1).is_err());
    }

    #[test]
    fn reset_forgets_identity() {
        let store = MemoryStore::new();
        write(&store, 0..2, 0.0);
        store.reset(&node()).unwrap();
        assert_eq!(store.chunk_count(&node()), 0);
        assert!(store.read(&node(), 0..1).is_err());
    }
}
