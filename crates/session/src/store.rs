//! Per-model session store
//!
//! Holds, for every opened model, its layout, the buffer its binary was
//! loaded into, its generated executions and the EXT buffers allocated on
//! the caller's behalf.
//!
//! # Thread Safety
//!
//! One mutex serializes every read and write of the model map. Operations
//! that must observe several fields at once (bind checks committed state,
//! slot layout and buffer size together) therefore see a consistent view.
//!
//! ## Bind checks
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. execution already committed, or frozen by a commit in progress
//! 2. no slot matches the selector
//! 3. slot is a partial view of its region (nonzero offset)
//! 4. slot size differs from the region's required size
//! 5. buffer size differs from the slot size

use crate::execution::{Execution, ExecutionSet, RegionBinding};
use nerve_core::{
    BufferCounts, BufferInfo, Direction, Error, ExecutionId, ModelId, Result, Session, SessionId,
    SlotSelector,
};
use nerve_memory::Buffer;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

struct ModelEntry {
    session: Arc<Session>,
    loaded: Option<Arc<Buffer>>,
    executions: Option<ExecutionSet>,
    auto_allocated: FxHashMap<SessionId, Vec<Arc<Buffer>>>,
}

impl ModelEntry {
    fn execution(&self, model_id: ModelId, session_id: SessionId) -> Result<&Execution> {
        let set = self
            .executions
            .as_ref()
            .ok_or(Error::ExecutionsNotGenerated {
                model_id,
                session_id,
            })?;
        set.get(session_id).ok_or(Error::SessionOutOfRange {
            model_id,
            session_id,
            count: set.len(),
        })
    }

    fn execution_mut(
        &mut self,
        model_id: ModelId,
        session_id: SessionId,
    ) -> Result<&mut Execution> {
        let set = self
            .executions
            .as_mut()
            .ok_or(Error::ExecutionsNotGenerated {
                model_id,
                session_id,
            })?;
        let count = set.len();
        set.get_mut(session_id).ok_or(Error::SessionOutOfRange {
            model_id,
            session_id,
            count,
        })
    }
}

fn check_bindable(execution: &Execution, model_id: ModelId, session_id: SessionId) -> Result<()> {
    if execution.is_committed() {
        return Err(Error::AlreadyCommitted {
            model_id,
            session_id,
        });
    }
    if execution.is_frozen() {
        return Err(Error::CommitInProgress {
            model_id,
            session_id,
        });
    }
    Ok(())
}

fn check_bindings(session: &Session, execution: &Execution) -> Result<()> {
    let total = session.regions.len();
    let bound = execution.bound_count();
    if bound != total || execution.region_count() != total {
        return Err(Error::UnboundRegions {
            unbound: total.saturating_sub(bound),
            total,
        });
    }

    for region in &session.regions {
        let binding = execution
            .binding(region.index)
            .ok_or(Error::RegionOutOfRange(region.index))?;
        if binding.size != region.required_size {
            return Err(Error::SizeMismatch {
                target: format!("region {}", region.index),
                expected: region.required_size,
                actual: binding.size,
            });
        }
    }
    Ok(())
}

/// Session and execution state for every opened model.
#[derive(Default)]
pub struct SessionStore {
    models: Mutex<FxHashMap<ModelId, ModelEntry>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(
        &self,
        model_id: ModelId,
        f: impl FnOnce(&ModelEntry) -> Result<T>,
    ) -> Result<T> {
        let models = self.models.lock();
        let entry = models
            .get(&model_id)
            .ok_or(Error::ModelNotFound(model_id))?;
        f(entry)
    }

    fn with_entry_mut<T>(
        &self,
        model_id: ModelId,
        f: impl FnOnce(&mut ModelEntry) -> Result<T>,
    ) -> Result<T> {
        let mut models = self.models.lock();
        let entry = models
            .get_mut(&model_id)
            .ok_or(Error::ModelNotFound(model_id))?;
        f(entry)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Record the layout of a freshly opened model.
    ///
    /// Overwriting an existing model replaces its layout and loaded buffer and
    /// discards its executions; auto-allocated buffers are kept so they can
    /// still be released. The layout must pass [`Session::validate`].
    pub fn set_session(&self, session: Session, loaded: Option<Arc<Buffer>>) -> Result<()> {
        let model_id = session.model_id;
        if !model_id.is_valid() {
            return Err(Error::InvalidModelId(model_id));
        }
        session.validate()?;

        let mut models = self.models.lock();
        match models.get_mut(&model_id) {
            Some(entry) => {
                tracing::warn!(model_id = %model_id, "overwriting existing session");
                entry.session = Arc::new(session);
                entry.loaded = loaded;
                entry.executions = None;
            }
            None => {
                models.insert(
                    model_id,
                    ModelEntry {
                        session: Arc::new(session),
                        loaded,
                        executions: None,
                        auto_allocated: FxHashMap::default(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Layout of `model_id`.
    pub fn session(&self, model_id: ModelId) -> Result<Arc<Session>> {
        self.with_entry(model_id, |entry| Ok(Arc::clone(&entry.session)))
    }

    /// Buffer the model binary was loaded into.
    pub fn loaded_buffer(&self, model_id: ModelId) -> Result<Option<Arc<Buffer>>> {
        self.with_entry(model_id, |entry| Ok(entry.loaded.clone()))
    }

    /// Forget everything about `model_id`.
    pub fn clear_model(&self, model_id: ModelId) -> Result<()> {
        let mut models = self.models.lock();
        match models.remove(&model_id) {
            Some(entry) => {
                let leaked: usize = entry.auto_allocated.values().map(Vec::len).sum();
                if leaked > 0 {
                    tracing::warn!(
                        model_id = %model_id,
                        count = leaked,
                        "clearing model with unreleased auto-allocated buffers"
                    );
                }
                Ok(())
            }
            None => Err(Error::ModelNotFound(model_id)),
        }
    }

    /// Ids of every model with a session.
    pub fn model_ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self.models.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of models with a session.
    pub fn len(&self) -> usize {
        self.models.lock().len()
    }

    /// Whether no model has a session.
    pub fn is_empty(&self) -> bool {
        self.models.lock().is_empty()
    }

    // ========================================================================
    // Executions
    // ========================================================================

    /// Replace the model's executions with `count` fresh ones.
    pub fn generate_executions(&self, model_id: ModelId, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::InvalidExecutionCount);
        }
        self.with_entry_mut(model_id, |entry| {
            if entry.executions.is_some() {
                tracing::debug!(model_id = %model_id, count, "regenerating executions");
            }
            entry.executions = Some(ExecutionSet::new(count, entry.session.regions.len()));
            Ok(())
        })
    }

    /// Generate a single execution if the model has none and `session_id` is 0.
    ///
    /// Any other session id on a model without executions is an error.
    pub fn ensure_executions(&self, model_id: ModelId, session_id: SessionId) -> Result<()> {
        self.with_entry_mut(model_id, |entry| {
            if entry.executions.is_some() {
                return Ok(());
            }
            if session_id != 0 {
                return Err(Error::ExecutionsNotGenerated {
                    model_id,
                    session_id,
                });
            }
            tracing::debug!(model_id = %model_id, "generating implicit execution");
            entry.executions = Some(ExecutionSet::new(1, entry.session.regions.len()));
            Ok(())
        })
    }

    /// Number of generated executions (0 when none).
    pub fn execution_count(&self, model_id: ModelId) -> Result<usize> {
        self.with_entry(model_id, |entry| {
            Ok(entry.executions.as_ref().map_or(0, ExecutionSet::len))
        })
    }

    /// Snapshot of one execution.
    pub fn execution(&self, model_id: ModelId, session_id: SessionId) -> Result<Execution> {
        self.with_entry(model_id, |entry| {
            entry.execution(model_id, session_id).cloned()
        })
    }

    /// Whether the execution has been committed.
    pub fn is_committed(&self, model_id: ModelId, session_id: SessionId) -> Result<bool> {
        self.with_entry(model_id, |entry| {
            Ok(entry.execution(model_id, session_id)?.is_committed())
        })
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Bind `buffer` to the slot named by `selector`.
    ///
    /// Returns the index of the region the buffer now backs.
    pub fn bind(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        selector: &SlotSelector,
        buffer: &Arc<Buffer>,
    ) -> Result<usize> {
        self.with_entry_mut(model_id, |entry| {
            let session = Arc::clone(&entry.session);
            let execution = entry.execution_mut(model_id, session_id)?;
            check_bindable(execution, model_id, session_id)?;

            let slot = session
                .find_slot(selector)
                .ok_or_else(|| Error::SlotNotFound(selector.clone()))?;
            if slot.offset != 0 {
                return Err(Error::PartialBinding(selector.clone(), slot.offset));
            }

            let region = session
                .region(slot.region_index)
                .ok_or(Error::RegionOutOfRange(slot.region_index))?;
            if slot.size != region.required_size {
                return Err(Error::SizeMismatch {
                    target: format!("region {}", region.index),
                    expected: region.required_size,
                    actual: slot.size,
                });
            }
            if buffer.size() != slot.size {
                return Err(Error::SizeMismatch {
                    target: format!("slot {}", selector),
                    expected: slot.size,
                    actual: buffer.size(),
                });
            }

            execution.bind(slot.region_index, RegionBinding::new(buffer));
            tracing::debug!(
                model_id = %model_id,
                session_id,
                region = slot.region_index,
                slot = %selector,
                size = buffer.size(),
                "buffer bound"
            );
            Ok(slot.region_index)
        })
    }

    /// Bind `buffer` directly to a region, bypassing slot lookup.
    pub fn bind_region(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        region_index: usize,
        buffer: &Arc<Buffer>,
    ) -> Result<()> {
        self.with_entry_mut(model_id, |entry| {
            let required = entry
                .session
                .region(region_index)
                .ok_or(Error::RegionOutOfRange(region_index))?
                .required_size;
            let execution = entry.execution_mut(model_id, session_id)?;
            check_bindable(execution, model_id, session_id)?;
            if buffer.size() != required {
                return Err(Error::SizeMismatch {
                    target: format!("region {}", region_index),
                    expected: required,
                    actual: buffer.size(),
                });
            }
            execution.bind(region_index, RegionBinding::new(buffer));
            Ok(())
        })
    }

    /// Drop the binding of `region_index`.
    pub fn unbind_region(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        region_index: usize,
    ) -> Result<()> {
        self.with_entry_mut(model_id, |entry| {
            entry.execution_mut(model_id, session_id)?.unbind(region_index);
            Ok(())
        })
    }

    /// Regions behind EXT slots that have no binding yet, with their sizes.
    pub fn unbound_ext_regions(
        &self,
        model_id: ModelId,
        session_id: SessionId,
    ) -> Result<Vec<(usize, usize)>> {
        self.with_entry(model_id, |entry| {
            let execution = entry.execution(model_id, session_id)?;
            let indexes: BTreeSet<usize> = entry
                .session
                .slots
                .iter()
                .filter(|slot| slot.direction == Direction::Ext)
                .map(|slot| slot.region_index)
                .filter(|&index| execution.binding(index).is_none())
                .collect();

            indexes
                .into_iter()
                .map(|index| {
                    entry
                        .session
                        .region(index)
                        .map(|region| (index, region.required_size))
                        .ok_or(Error::RegionOutOfRange(index))
                })
                .collect()
        })
    }

    /// Check that every region is bound with a buffer of the required size.
    pub fn verify(&self, model_id: ModelId, session_id: SessionId) -> Result<()> {
        self.with_entry(model_id, |entry| {
            check_bindings(&entry.session, entry.execution(model_id, session_id)?)
        })
    }

    /// Verify the bindings and freeze them until the commit finishes.
    ///
    /// Returns the snapshot handed to the dispatch layer. While frozen, every
    /// bind fails with [`Error::CommitInProgress`]; [`set_execution_id`] or
    /// [`thaw`] lift the freeze.
    ///
    /// [`set_execution_id`]: Self::set_execution_id
    /// [`thaw`]: Self::thaw
    pub fn freeze(&self, model_id: ModelId, session_id: SessionId) -> Result<Execution> {
        self.with_entry_mut(model_id, |entry| {
            let session = Arc::clone(&entry.session);
            let execution = entry.execution_mut(model_id, session_id)?;
            check_bindable(execution, model_id, session_id)?;
            check_bindings(&session, execution)?;
            execution.freeze();
            Ok(execution.clone())
        })
    }

    /// Lift the freeze of a commit that failed.
    pub fn thaw(&self, model_id: ModelId, session_id: SessionId) -> Result<()> {
        self.with_entry_mut(model_id, |entry| {
            entry.execution_mut(model_id, session_id)?.thaw();
            Ok(())
        })
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Record the id the dispatch layer assigned and mark the execution committed.
    pub fn set_execution_id(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        id: ExecutionId,
    ) -> Result<()> {
        if !id.is_assigned() {
            return Err(Error::InvalidArgument(
                "cannot assign the unassigned execution id".to_string(),
            ));
        }
        self.with_entry_mut(model_id, |entry| {
            let execution = entry.execution_mut(model_id, session_id)?;
            let existing = execution.execution_id();
            if existing.is_assigned() {
                return Err(Error::ExecutionIdAssigned {
                    model_id,
                    session_id,
                    existing,
                });
            }
            execution.assign(id);
            Ok(())
        })
    }

    /// Assigned execution id, or [`ExecutionId::UNASSIGNED`].
    pub fn execution_id(&self, model_id: ModelId, session_id: SessionId) -> Result<ExecutionId> {
        self.with_entry(model_id, |entry| {
            Ok(entry.execution(model_id, session_id)?.execution_id())
        })
    }

    // ========================================================================
    // Auto-allocated EXT buffers
    // ========================================================================

    /// Remember buffers allocated for EXT regions of one session.
    pub fn record_auto_allocated(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        buffers: Vec<Arc<Buffer>>,
    ) -> Result<()> {
        self.with_entry_mut(model_id, |entry| {
            entry
                .auto_allocated
                .entry(session_id)
                .or_default()
                .extend(buffers);
            Ok(())
        })
    }

    /// Take the auto-allocated buffers of one session.
    pub fn take_auto_allocated(
        &self,
        model_id: ModelId,
        session_id: SessionId,
    ) -> Result<Vec<Arc<Buffer>>> {
        self.with_entry_mut(model_id, |entry| {
            Ok(entry.auto_allocated.remove(&session_id).unwrap_or_default())
        })
    }

    /// Take the auto-allocated buffers of every session of a model.
    pub fn take_all_auto_allocated(&self, model_id: ModelId) -> Result<Vec<Arc<Buffer>>> {
        self.with_entry_mut(model_id, |entry| {
            let mut sessions: Vec<SessionId> = entry.auto_allocated.keys().copied().collect();
            sessions.sort_unstable();
            Ok(sessions
                .into_iter()
                .flat_map(|s| entry.auto_allocated.remove(&s).unwrap_or_default())
                .collect())
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// IN and OUT slot counts.
    pub fn buffer_counts(&self, model_id: ModelId) -> Result<BufferCounts> {
        self.with_entry(model_id, |entry| Ok(entry.session.buffer_counts()))
    }

    /// Description of the slot named by `selector`.
    pub fn buffer_info(&self, model_id: ModelId, selector: &SlotSelector) -> Result<BufferInfo> {
        self.with_entry(model_id, |entry| {
            entry
                .session
                .find_slot(selector)
                .map(BufferInfo::from)
                .ok_or_else(|| Error::SlotNotFound(selector.clone()))
        })
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("models", &self.model_ids())
            .finish()
    }
}
