//! Local Executor
//!
//! Realizes deferred handles on the calling thread. Results of tasks are
//! memoized by [`TaskKey`], so a chunk is computed at most once no matter how
//! many reads or downstream tasks refer to it. Results that were delivered
//! to a store are dropped from the memo and read back from the store.

use std::sync::Arc;

use dashmap::DashMap;

use super::{Delivery, Executor, Pending};
use crate::array::Array;
use crate::error::Result;
use crate::operation::{Deferred, OperationId, Task, TaskKey};

/// Synchronous, memoizing executor.
#[derive(Default)]
pub struct LocalExecutor {
    memo: DashMap<TaskKey, Array>,
    /// Deliveries waiting for a task that has not run yet.
    waiting: DashMap<TaskKey, Vec<Delivery>>,
    lazy: bool,
}

impl LocalExecutor {
    /// An executor that runs every task as soon as it is accepted.
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor that runs tasks only when their data is requested.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            ..Self::default()
        }
    }

    pub fn is_eager(&self) -> bool {
        !self.lazy
    }

    /// Number of memoized chunk results.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// Number of deliveries waiting for their task to run.
    pub fn waiting(&self) -> usize {
        self.waiting.iter().map(|entry| entry.len()).sum()
    }

    pub fn realize(&self, data: &Deferred) -> Result<Array> {
        match data {
            Deferred::Task(task) => self.run(task),
            Deferred::Literal { data, .. } => Ok(Array::clone(data)),
            Deferred::Stored { key, store } => store.read(&key.node, key.range()),
            Deferred::Rows { source, rows } => self.realize(source)?.rows(rows.clone()),
            Deferred::Concat(parts) => {
                let arrays = parts
                    .iter()
                    .map(|part| self.realize(part))
                    .collect::<Result<Vec<_>>>()?;
                Array::vstack(&arrays)
            }
            Deferred::Empty => Ok(Array::empty()),
        }
    }

    /// Hand `result` to `to`; on success the memoized copy is dropped.
    pub(crate) fn hand_over(&self, key: Option<&TaskKey>, result: Result<Array>, to: Delivery) -> Result<()> {
        to(result)?;
        if let Some(key) = key {
            self.memo.remove(key);
        }
        Ok(())
    }

    fn run(&self, task: &Task) -> Result<Array> {
        if let Some(hit) = self.memo.get(task.key()) {
            return Ok(hit.clone());
        }
        if let Some(store) = task.persisted() {
            let key = task.key();
            return store.read(&key.node, key.range());
        }
        let inputs = task
            .inputs()
            .iter()
            .map(|input| self.realize(input))
            .collect::<Result<Vec<_>>>()?;
        let output = task.run(inputs)?;
        self.memo.insert(task.key().clone(), output.clone());
        self.flush(task.key(), &output);
        Ok(output)
    }

    /// Fire the deliveries waiting for `key`.
    fn flush(&self, key: &TaskKey, output: &Array) {
        let Some((_, deliveries)) = self.waiting.remove(key) else {
            return;
        };
        for to in deliveries {
            if let Err(err) = self.hand_over(Some(key), Ok(output.clone()), to) {
                tracing::warn!(chunk = %key, error = %err, "delivery failed");
            }
        }
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("memoized", &self.memo.len())
            .field("waiting", &self.waiting.len())
            .field("lazy", &self.lazy)
            .finish()
    }
}

impl Executor for LocalExecutor {
    fn accept(&self, task: &Arc<Task>) -> Result<()> {
        if self.lazy {
            return Ok(());
        }
        self.run(task).map(drop)
    }

    fn compute(&self, data: &Deferred) -> Result<Array> {
        self.realize(data)
    }

    fn submit(&self, data: Deferred) -> Pending {
        Pending::ready(data.key().cloned(), self.realize(&data))
    }

    /// Eager executors and already computed tasks deliver right away. A lazy
    /// executor holds the delivery until the task runs for some other reason.
    fn deliver(&self, data: Deferred, to: Delivery) -> Result<()> {
        let task = match &data {
            Deferred::Task(task) if self.lazy && !self.memo.contains_key(task.key()) => task,
            _ => return self.hand_over(data.key(), self.realize(&data), to),
        };

        let key = task.key().clone();
        self.waiting.entry(key.clone()).or_default().push(to);
        // The task may have finished between the check and the push.
        let done = self.memo.get(&key).map(|hit| hit.clone());
        if let Some(output) = done {
            self.flush(&key, &output);
        }
        Ok(())
    }

    fn release(&self, node: &OperationId) {
        self.memo.retain(|key, _| &key.node != node);
        self.waiting.retain(|key, _| &key.node != node);
    }
}
