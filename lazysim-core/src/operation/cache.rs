//! Output Cache
//!
//! Each operation keeps an ordered list of the chunks it has produced. The
//! chunks are contiguous, never overlap and always cover `[0, len)`: a chunk
//! may only be appended where the previous one ended.
//!
//! With a backing store configured, every appended chunk is also handed to
//! the store once the executor has realized it. When the store reports that
//! a write completed, the chunk is flagged as stored and later reads fetch it
//! from the store instead of going through the original computation. The
//! computation handle itself is dropped at the next append.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;

use super::task::{Deferred, TaskKey};
use super::OperationId;
use crate::error::{Error, Result};
use crate::executor::{Delivery, Executor};
use crate::store::Store;

/// One generated range of a node's output.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub key: TaskKey,
    pub data: Deferred,
}

impl Chunk {
    pub fn range(&self) -> Range<usize> {
        self.key.range()
    }
}

/// Append-only, slice-indexed store of a node's chunks.
#[derive(Debug)]
pub struct OutputCache {
    /// Identity the chunks are keyed and stored under.
    node: OperationId,
    chunks: Vec<Chunk>,

    /// Stored flag per chunk key. Shared with pending store callbacks.
    stored: Arc<DashMap<TaskKey, bool>>,

    store: Option<Arc<dyn Store>>,
}

impl OutputCache {
    pub fn new(node: OperationId, store: Option<Arc<dyn Store>>) -> Self {
        Self {
            node,
            chunks: Vec::new(),
            stored: Arc::new(DashMap::new()),
            store,
        }
    }

    /// Total number of samples held.
    pub fn len(&self) -> usize {
        self.chunks.last().map_or(0, |chunk| chunk.key.stop)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn node_id(&self) -> &OperationId {
        &self.node
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    pub fn is_stored(&self, key: &TaskKey) -> bool {
        self.stored.get(key).is_some_and(|flag| *flag)
    }

    /// Append a chunk at the end of the cache.
    ///
    /// Fails without mutation if the chunk does not start at [`len`](Self::len).
    /// If a store is configured the chunk is delivered to it through
    /// `executor`; a write that fails before this returns also leaves the
    /// cache unchanged.
    pub fn append(&mut self, chunk: Chunk, executor: &Arc<dyn Executor>) -> Result<()> {
        let len = self.len();
        if chunk.key.start != len {
            return Err(Error::Contiguity {
                start: chunk.key.start,
                len,
            });
        }

        tracing::debug!(chunk = %chunk.key, "appending chunk");
        self.stored.insert(chunk.key.clone(), false);
        if let Some(store) = &self.store {
            let delivery = persist(store, &self.stored, &chunk);
            if let Err(err) = executor.deliver(chunk.data.clone(), delivery) {
                self.stored.remove(&chunk.key);
                return Err(err);
            }
        }
        self.chunks.push(chunk);
        self.settle();
        Ok(())
    }

    /// Swap the computation handles of stored chunks for store references.
    pub fn settle(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        for chunk in &mut self.chunks {
            if matches!(chunk.data, Deferred::Stored { .. }) {
                continue;
            }
            if self.stored.get(&chunk.key).is_some_and(|flag| *flag) {
                chunk.data = Deferred::Stored {
                    key: chunk.key.clone(),
                    store: Arc::clone(store),
                };
            }
        }
    }

    /// Handle to the samples in `range` that have been appended so far.
    pub fn read(&self, range: Range<usize>) -> Deferred {
        let mut parts = Vec::new();
        for chunk in &self.chunks {
            let own = chunk.range();
            let start = own.start.max(range.start);
            let stop = own.end.min(range.end);
            if start >= stop {
                continue;
            }

            let data = match &self.store {
                Some(store) if self.is_stored(&chunk.key) => Deferred::Stored {
                    key: chunk.key.clone(),
                    store: Arc::clone(store),
                },
                _ => chunk.data.clone(),
            };

            if stop - start == own.len() {
                parts.push(data);
            } else {
                parts.push(Deferred::Rows {
                    source: Box::new(data),
                    rows: start - own.start..stop - own.start,
                });
            }
        }

        match parts.len() {
            0 => Deferred::Empty,
            1 => parts.swap_remove(0),
            _ => Deferred::Concat(parts),
        }
    }

    /// Record that the chunk with `key` has been durably written.
    pub fn mark_stored(&self, key: &TaskKey) -> Result<()> {
        mark_stored(&self.stored, key)
    }

    /// Purge the store entry of the current identity, drop all chunks and
    /// rebind to `node`. Nothing changes if the store cannot be purged.
    pub fn reset(&mut self, node: OperationId) -> Result<()> {
        if let Some(store) = &self.store {
            store.reset(&self.node)?;
        }
        self.chunks.clear();
        self.stored.clear();
        self.node = node;
        Ok(())
    }
}

/// Delivery writing a chunk to `store` and flagging it on completion.
fn persist(store: &Arc<dyn Store>, flags: &Arc<DashMap<TaskKey, bool>>, chunk: &Chunk) -> Delivery {
    let store = Arc::clone(store);
    let flags = Arc::clone(flags);
    let key = chunk.key.clone();
    let task = match &chunk.data {
        Deferred::Task(task) => Some(Arc::clone(task)),
        _ => None,
    };
    Box::new(move |realized| {
        let target = Arc::clone(&store);
        store.write(
            key,
            realized?,
            Box::new(move |key, written| {
                written?;
                mark_stored(&flags, key)?;
                if let Some(task) = task {
                    task.persisted_in(target);
                }
                Ok(())
            }),
        )
    })
}

fn mark_stored(flags: &DashMap<TaskKey, bool>, key: &TaskKey) -> Result<()> {
    match flags.get_mut(key) {
        Some(mut flag) => {
            *flag = true;
            Ok(())
        }
        None => {
            tracing::warn!(chunk = %key, "store completion does not match any chunk");
            Err(Error::ChunkLookup {
                key: key.to_string(),
                matches: 0,
            })
        }
    }
}
