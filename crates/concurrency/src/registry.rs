//! Registry of in-flight asynchronous executions
//!
//! An asynchronous execute registers its [`PendingExecution`] under the
//! execution id *before* the work is handed to the pool, so a caller that
//! receives success can always find the entry again with [`take`].
//!
//! ## Draining
//!
//! Closing a model or tearing down the runtime must not leave work running
//! against buffers that are about to be freed. [`drain_for`] and
//! [`drain_all`] remove the matching entries under the lock and then wait for
//! each of them with the lock released, logging every execution the caller
//! never waited for.
//!
//! # Thread Safety
//!
//! The map has its own mutex, disjoint from every other runtime lock. The
//! lock is never held while waiting on a result.
//!
//! [`take`]: AsyncExecutionRegistry::take
//! [`drain_for`]: AsyncExecutionRegistry::drain_for
//! [`drain_all`]: AsyncExecutionRegistry::drain_all

use crate::pending::PendingExecution;
use nerve_core::{Error, ExecutionId, ModelId, Result};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashMap;
use std::sync::mpsc;

/// Worker threads used when no count is configured.
pub const DEFAULT_ASYNC_WORKERS: usize = 4;

/// In-flight asynchronous executions and the pool that runs them.
pub struct AsyncExecutionRegistry {
    pending: Mutex<FxHashMap<ExecutionId, PendingExecution>>,
    pool: ThreadPool,
}

impl AsyncExecutionRegistry {
    /// Create a registry backed by `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::Config("async worker count must be positive".to_string()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("nerve-async-{}", i))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build async pool: {}", e)))?;
        Ok(AsyncExecutionRegistry {
            pending: Mutex::new(FxHashMap::default()),
            pool,
        })
    }

    /// Whether `id` has an entry.
    pub fn has(&self, id: ExecutionId) -> bool {
        self.pending.lock().contains_key(&id)
    }

    /// Register a deferred result. Fails if `id` is already present.
    pub fn put(&self, id: ExecutionId, pending: PendingExecution) -> Result<()> {
        let mut map = self.pending.lock();
        if map.contains_key(&id) {
            return Err(Error::AsyncAlreadyPending(id));
        }
        map.insert(id, pending);
        Ok(())
    }

    /// Remove and return the entry for `id`.
    ///
    /// An absent id yields an already-failed result rather than an error, so
    /// callers can always wait on what they get back.
    pub fn take(&self, id: ExecutionId) -> PendingExecution {
        match self.pending.lock().remove(&id) {
            Some(pending) => pending,
            None => PendingExecution::ready(Err(Error::AsyncNotPending(id))),
        }
    }

    /// Register `id` and run `task` on the pool.
    ///
    /// The entry exists before the task is scheduled.
    pub fn submit<F>(&self, id: ExecutionId, task: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.put(id, PendingExecution::Channel(rx))?;
        self.pool.spawn(move || {
            let result = task();
            if let Err(e) = &result {
                tracing::debug!(execution_id = %id, error = %e, "async execution failed");
            }
            // Receiver may already be gone if the entry was drained and dropped.
            let _ = tx.send(result);
        });
        Ok(())
    }

    /// Wait out every entry belonging to `model_id`. Returns how many there were.
    pub fn drain_for(&self, model_id: ModelId) -> usize {
        let drained: Vec<(ExecutionId, PendingExecution)> = {
            let mut map = self.pending.lock();
            let ids: Vec<ExecutionId> = map
                .keys()
                .filter(|id| id.model_component() == model_id)
                .copied()
                .collect();
            ids.into_iter()
                .filter_map(|id| map.remove(&id).map(|p| (id, p)))
                .collect()
        };
        Self::wait_missed(drained)
    }

    /// Wait out every entry. Returns how many there were.
    pub fn drain_all(&self) -> usize {
        let drained: Vec<(ExecutionId, PendingExecution)> =
            self.pending.lock().drain().collect();
        Self::wait_missed(drained)
    }

    fn wait_missed(drained: Vec<(ExecutionId, PendingExecution)>) -> usize {
        let count = drained.len();
        for (id, pending) in drained {
            tracing::warn!(execution_id = %id, "async execution missed by caller; waiting");
            if let Err(e) = pending.wait() {
                tracing::warn!(execution_id = %id, error = %e, "drained async execution failed");
            }
        }
        count
    }

    /// Number of in-flight entries.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Worker thread count.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl std::fmt::Debug for AsyncExecutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncExecutionRegistry")
            .field("pending", &self.len())
            .field("workers", &self.workers())
            .finish()
    }
}
