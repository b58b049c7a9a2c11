//! Backing Stores
//!
//! A store persists chunks outside the output cache. Once a chunk is
//! persisted the cache reads it back from the store instead of keeping the
//! computation that produced it.
//!
//! Any positioned slice container can back a store, as long as reading a
//! written slice returns exactly the written values. [`SinkStore`] adapts
//! such containers; [`MemoryStore`] keeps encoded chunks in memory.

mod memory;
mod sink;

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::array::Array;
use crate::error::{Error, Result};
use crate::operation::{OperationId, TaskKey};

pub use memory::MemoryStore;
pub use sink::{Preallocated, SinkStore, SliceSink};

/// Completion callback for [`Store::write`]: receives the chunk key and the
/// outcome of the write.
pub type StoredCallback = Box<dyn FnOnce(&TaskKey, Result<()>) -> Result<()> + Send>;

/// Durable storage for chunks, keyed by operation identity and sample range.
pub trait Store: Send + Sync + fmt::Debug {
    /// Persist the realized data of chunk `key` and call `on_done` once the
    /// write has finished.
    ///
    /// Callers hand data over from whichever executor worker realized it.
    fn write(&self, key: TaskKey, data: Array, on_done: StoredCallback) -> Result<()>;

    /// Read back persisted samples of `node` in `range`.
    fn read(&self, node: &OperationId, range: Range<usize>) -> Result<Array>;

    /// Remove everything persisted for `node`.
    fn reset(&self, node: &OperationId) -> Result<()>;
}

/// Resolve a store identifier from configuration.
///
/// `None` means no store and `"cache"` (in any case) an in-memory store.
pub fn prepare_store(spec: Option<&str>) -> Result<Option<Arc<dyn Store>>> {
    match spec {
        None => Ok(None),
        Some(name) if name.eq_ignore_ascii_case("cache") => Ok(Some(Arc::new(MemoryStore::new()))),
        Some(name) => Err(Error::UnknownStore(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_store_identifiers() {
        assert!(prepare_store(None).unwrap().is_none());
        assert!(prepare_store(Some("cache")).unwrap().is_some());
        assert!(prepare_store(Some("Cache")).unwrap().is_some());
        assert!(matches!(
            prepare_store(Some("disk")),
            Err(Error::UnknownStore(name)) if name == "disk"
        ));
    }
}
