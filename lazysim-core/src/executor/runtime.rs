//! Tokio-backed Executor
//!
//! Hands realization to the blocking thread pool of a tokio runtime, so
//! `submit` returns a future that completes independently of the caller.
//! Tasks are not run on acceptance; contract violations surface when the
//! data is realized. Deliveries to a store run in the background as well.

use std::sync::Arc;

use tokio::runtime::Handle;

use super::{Delivery, Executor, LocalExecutor, Pending};
use crate::array::Array;
use crate::error::{Error, Result};
use crate::operation::{Deferred, OperationId, Task};

/// Realizes handles on a tokio runtime, sharing one memo across workers.
#[derive(Debug, Clone)]
pub struct SpawningExecutor {
    local: Arc<LocalExecutor>,
    handle: Handle,
}

impl SpawningExecutor {
    pub fn new(handle: Handle) -> Self {
        Self {
            local: Arc::new(LocalExecutor::lazy()),
            handle,
        }
    }

    /// Use the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|err| Error::Task(err.to_string()))
    }

    pub fn memoized(&self) -> usize {
        self.local.memoized()
    }
}

impl Executor for SpawningExecutor {
    fn accept(&self, _task: &Arc<Task>) -> Result<()> {
        Ok(())
    }

    /// Realize on the calling thread. Must not be called from inside an
    /// async task.
    fn compute(&self, data: &Deferred) -> Result<Array> {
        self.local.realize(data)
    }

    fn submit(&self, data: Deferred) -> Pending {
        let key = data.key().cloned();
        let local = Arc::clone(&self.local);
        let join = self.handle.spawn_blocking(move || local.realize(&data));
        Pending::new(key, async move {
            match join.await {
                Ok(result) => result,
                Err(err) => Err(Error::Task(err.to_string())),
            }
        })
    }

    fn deliver(&self, data: Deferred, to: Delivery) -> Result<()> {
        let local = Arc::clone(&self.local);
        self.handle.spawn_blocking(move || {
            let key = data.key().cloned();
            let result = local.realize(&data);
            if let Err(err) = local.hand_over(key.as_ref(), result, to) {
                tracing::warn!(error = %err, "background delivery failed");
            }
        });
        Ok(())
    }

    fn release(&self, node: &OperationId) {
        self.local.release(node);
    }
}
