//! Executors
//!
//! The engine only describes computations. An [`Executor`] decides when and
//! where they run:
//!
//! - [`LocalExecutor`] realizes tasks on the calling thread and memoizes
//!   results by task key. By default it runs each task as soon as the engine
//!   accepts it, so contract violations surface before the chunk is cached.
//! - [`SpawningExecutor`] realizes on a tokio runtime and hands out futures.
//!
//! Pipelined callers keep several [`Pending`] results in flight and react to
//! whichever finishes first with [`wait_first`].
//!
//! Output caches persist chunks through [`Executor::deliver`]: the chunk is
//! realized whenever the executor would realize it anyway, and the result is
//! handed to the store from there. Once a delivery succeeds the executor no
//! longer keeps its own copy of the result.

mod local;
mod runtime;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::{self, BoxFuture};

use crate::array::Array;
use crate::error::Result;
use crate::operation::{Deferred, OperationId, Task, TaskKey};

pub use local::LocalExecutor;
pub use runtime::SpawningExecutor;

/// Receives the realized data of a chunk. Returns the outcome of whatever
/// the receiver did with it.
pub type Delivery = Box<dyn FnOnce(Result<Array>) -> Result<()> + Send + Sync>;

/// Runs task descriptions.
pub trait Executor: Send + Sync {
    /// Called for every new task before its chunk is appended. An error
    /// here keeps the chunk out of the cache.
    fn accept(&self, task: &Arc<Task>) -> Result<()>;

    /// Realize a handle, blocking until the data is available.
    fn compute(&self, data: &Deferred) -> Result<Array>;

    /// Start realizing a handle and return a future of the result.
    fn submit(&self, data: Deferred) -> Pending;

    /// Realize `data` and hand the result to `to`, either before returning
    /// or once the data gets computed.
    ///
    /// Returns the outcome of `to` when it ran before returning. Outcomes of
    /// later deliveries are logged.
    fn deliver(&self, data: Deferred, to: Delivery) -> Result<()> {
        to(self.compute(&data))
    }

    /// Forget memoized results of an operation identity that was reset.
    fn release(&self, _node: &OperationId) {}
}

/// A result that may not be available yet.
pub struct Pending {
    key: Option<TaskKey>,
    future: BoxFuture<'static, Result<Array>>,
}

impl Pending {
    pub fn new(
        key: Option<TaskKey>,
        future: impl Future<Output = Result<Array>> + Send + 'static,
    ) -> Self {
        Self {
            key,
            future: Box::pin(future),
        }
    }

    /// An already completed result.
    pub fn ready(key: Option<TaskKey>, result: Result<Array>) -> Self {
        Self::new(key, future::ready(result))
    }

    /// Key of the chunk being realized, if the handle is a whole chunk.
    pub fn key(&self) -> Option<&TaskKey> {
        self.key.as_ref()
    }
}

impl Future for Pending {
    type Output = Result<Array>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.as_mut().poll(cx)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").field("key", &self.key).finish_non_exhaustive()
    }
}

/// The first of a set of pending results to complete.
#[derive(Debug)]
pub struct Completed {
    /// Position of the completed result in the input.
    pub index: usize,
    pub key: Option<TaskKey>,
    pub result: Result<Array>,
    /// The others, still pending, in their original order.
    pub remaining: Vec<Pending>,
}

/// Wait for whichever of `pending` completes first.
///
/// Returns `None` when there is nothing to wait for.
pub async fn wait_first(pending: Vec<Pending>) -> Option<Completed> {
    if pending.is_empty() {
        return None;
    }
    let keys: Vec<Option<TaskKey>> = pending.iter().map(|p| p.key.clone()).collect();
    let (result, index, remaining) = future::select_all(pending).await;
    Some(Completed {
        index,
        key: keys.into_iter().nth(index).flatten(),
        result,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_first_on_nothing() {
        assert!(wait_first(Vec::new()).await.is_none());
    }

    #[tokio::test]
    async fn wait_first_returns_the_ready_one() {
        let slow = Pending::new(None, async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(Array::scalar(0.0))
        });
        let key = TaskKey::new(OperationId::new("g", "x", 0), 0..1);
        let fast = Pending::ready(Some(key.clone()), Ok(Array::scalar(1.0)));

        let done = wait_first(vec![slow, fast]).await.unwrap();
        assert_eq!(done.index, 1);
        assert_eq!(done.key, Some(key));
        assert_eq!(done.result.unwrap(), Array::scalar(1.0));
        assert_eq!(done.remaining.len(), 1);
    }
}
