//! Commit and execution
//!
//! ## Commit sequence
//!
//! ```text
//! 1. reject an already committed execution
//! 2. release EXT buffers left over from an earlier commit attempt
//! 3. allocate and bind a buffer for every unbound EXT region
//! 4. verify every region is bound at its required size and freeze the
//!    bindings (binds now fail with `CommitInProgress`)
//! 5. hand the frozen snapshot to the dispatch layer, get its id
//! 6. record the id (execution becomes Committed)
//! 7. remember the buffers from step 3 so close can release them
//! ```
//!
//! If any step from 3 on fails, the execution is thawed and the buffers
//! allocated in step 3 are unbound and released, leaving the execution as it
//! was before the call.

use super::guard::BufferGuard;
use crate::context::{Components, ProcessContext};
use nerve_core::{Error, ExecutionId, ModelId, Result, SessionId};
use nerve_memory::CachePolicy;
use std::sync::Arc;

impl ProcessContext {
    /// Commit an execution to the dispatch layer.
    pub fn commit(&self, model_id: ModelId, session_id: SessionId) -> Result<ExecutionId> {
        let components = self.components()?;
        let _commit = self.commit_lock.lock();

        if components.store.is_committed(model_id, session_id)? {
            return Err(Error::AlreadyCommitted {
                model_id,
                session_id,
            });
        }

        let stale = components.store.take_auto_allocated(model_id, session_id)?;
        if !stale.is_empty() {
            tracing::warn!(
                model_id = %model_id,
                session_id,
                count = stale.len(),
                "releasing auto-allocated buffers from an earlier commit"
            );
            for buffer in &stale {
                if let Err(e) = components.registry.delete(buffer) {
                    tracing::warn!(error = %e, "failed to release stale auto-allocated buffer");
                }
            }
        }

        let mut guard = BufferGuard::new(&components.registry);
        let mut bound_regions = Vec::new();
        let result = self.commit_steps(
            &components,
            model_id,
            session_id,
            &mut guard,
            &mut bound_regions,
        );

        match result {
            Ok(id) => {
                guard.disarm();
                tracing::info!(
                    model_id = %model_id,
                    session_id,
                    execution_id = %id,
                    "execution committed"
                );
                Ok(id)
            }
            Err(e) => {
                if let Err(thaw_err) = components.store.thaw(model_id, session_id) {
                    tracing::debug!(error = %thaw_err, "execution gone before rollback");
                }
                for region in bound_regions {
                    if let Err(unbind_err) =
                        components.store.unbind_region(model_id, session_id, region)
                    {
                        tracing::error!(
                            region,
                            error = %unbind_err,
                            "failed to unbind region during rollback"
                        );
                    }
                }
                tracing::warn!(model_id = %model_id, session_id, error = %e, "commit rolled back");
                Err(e)
            }
        }
    }

    fn commit_steps(
        &self,
        components: &Arc<Components>,
        model_id: ModelId,
        session_id: SessionId,
        guard: &mut BufferGuard<'_>,
        bound_regions: &mut Vec<usize>,
    ) -> Result<ExecutionId> {
        for (region, size) in components
            .store
            .unbound_ext_regions(model_id, session_id)?
        {
            let buffer = components.registry.create(size, CachePolicy::Cached)?;
            guard.push(Arc::clone(&buffer));
            components
                .store
                .bind_region(model_id, session_id, region, &buffer)?;
            bound_regions.push(region);
            tracing::debug!(
                model_id = %model_id,
                session_id,
                region,
                size,
                "EXT region auto-allocated"
            );
        }

        let execution = components.store.freeze(model_id, session_id)?;
        let id = self.dispatcher.commit_execution(model_id, &execution)?;
        if !id.is_assigned() {
            return Err(Error::Dispatch(
                "dispatch layer returned no execution id".to_string(),
            ));
        }
        components.store.set_execution_id(model_id, session_id, id)?;

        if !guard.is_empty() {
            components
                .store
                .record_auto_allocated(model_id, session_id, guard.held().to_vec())?;
        }
        Ok(id)
    }

    /// Run an execution on the calling thread, committing it first if needed.
    pub fn execute(&self, model_id: ModelId, session_id: SessionId) -> Result<()> {
        let components = self.components()?;
        let id = if components.store.is_committed(model_id, session_id)? {
            components.store.execution_id(model_id, session_id)?
        } else {
            self.commit(model_id, session_id)?
        };
        self.dispatcher.execute(id)
    }

    /// Start a committed execution on the async pool.
    ///
    /// The pending result is registered before this returns; collect it with
    /// [`wait`](Self::wait).
    pub fn execute_async(&self, model_id: ModelId, session_id: SessionId) -> Result<ExecutionId> {
        let components = self.components()?;
        if !components.store.is_committed(model_id, session_id)? {
            return Err(Error::NotCommitted {
                model_id,
                session_id,
            });
        }
        let id = components.store.execution_id(model_id, session_id)?;

        let dispatcher = Arc::clone(&self.dispatcher);
        components
            .async_registry
            .submit(id, move || dispatcher.execute(id))?;
        tracing::debug!(execution_id = %id, "async execution submitted");
        Ok(id)
    }

    /// Block until the async execution of this session finishes.
    pub fn wait(&self, model_id: ModelId, session_id: SessionId) -> Result<()> {
        let components = self.components()?;
        let id = components.store.execution_id(model_id, session_id)?;
        if !id.is_assigned() {
            return Err(Error::NotCommitted {
                model_id,
                session_id,
            });
        }
        components.async_registry.take(id).wait()
    }

    /// Execution id assigned at commit, or [`ExecutionId::UNASSIGNED`].
    pub fn execution_id(&self, model_id: ModelId, session_id: SessionId) -> Result<ExecutionId> {
        self.components()?
            .store
            .execution_id(model_id, session_id)
    }
}
