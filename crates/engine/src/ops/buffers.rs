//! Buffer allocation and release

use super::guard::BufferGuard;
use crate::context::ProcessContext;
use nerve_core::{Direction, ModelId, Result, SessionId, SlotSelector};
use nerve_memory::{Buffer, CachePolicy, NativeDescriptor};
use std::sync::Arc;

/// Buffers created by [`ProcessContext::allocate_all_buffers`].
#[derive(Debug, Clone)]
pub struct AllocatedBuffers {
    /// One buffer per IN slot, in index order
    pub inputs: Vec<Arc<Buffer>>,
    /// One buffer per OUT slot, in index order
    pub outputs: Vec<Arc<Buffer>>,
}

impl AllocatedBuffers {
    /// Inputs followed by outputs.
    pub fn all(&self) -> Vec<Arc<Buffer>> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .cloned()
            .collect()
    }
}

impl ProcessContext {
    /// Allocate a buffer of `size` bytes.
    pub fn allocate_buffer(&self, size: usize) -> Result<Arc<Buffer>> {
        self.allocate_buffer_with(size, CachePolicy::Cached)
    }

    /// Allocate a buffer with an explicit cache policy.
    pub fn allocate_buffer_with(&self, size: usize, cache: CachePolicy) -> Result<Arc<Buffer>> {
        self.components()?.registry.create(size, cache)
    }

    /// Import memory identified by a native descriptor.
    pub fn allocate_from_native(
        &self,
        descriptor: NativeDescriptor,
        size: usize,
        offset: usize,
    ) -> Result<Arc<Buffer>> {
        self.components()?
            .registry
            .create_from_native(descriptor, size, offset)
    }

    /// Create a view over part of `base`.
    pub fn allocate_view(&self, base: &Buffer, size: usize, offset: usize) -> Result<Arc<Buffer>> {
        self.components()?.registry.create_view(base, size, offset)
    }

    /// Release one buffer.
    pub fn release_buffer(&self, buffer: &Arc<Buffer>) -> Result<()> {
        self.components()?.registry.delete(buffer)
    }

    /// Release every buffer in `buffers`.
    ///
    /// All releases are attempted; the first failure is returned.
    pub fn release_buffers(&self, buffers: &[Arc<Buffer>]) -> Result<()> {
        let components = self.components()?;
        let mut first_error = None;
        for buffer in buffers {
            if let Err(e) = components.registry.delete(buffer) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Allocate and bind a buffer for every IN and OUT slot, optionally committing.
    ///
    /// On failure every buffer allocated here is released.
    pub fn allocate_all_buffers(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        commit: bool,
    ) -> Result<AllocatedBuffers> {
        let components = self.components()?;
        let session = components.store.session(model_id)?;
        components.store.ensure_executions(model_id, session_id)?;

        let input_slots = session.slots_of(Direction::In);
        let output_slots = session.slots_of(Direction::Out);

        let mut guard = BufferGuard::new(&components.registry);
        for (direction, slots) in [(Direction::In, &input_slots), (Direction::Out, &output_slots)] {
            for slot in slots {
                let buffer = components.registry.create(slot.size, CachePolicy::Cached)?;
                guard.push(Arc::clone(&buffer));
                components.store.bind(
                    model_id,
                    session_id,
                    &SlotSelector::Index(direction, slot.slot_index),
                    &buffer,
                )?;
            }
        }

        if commit {
            self.commit(model_id, session_id)?;
        }

        let mut inputs = guard.disarm();
        let outputs = inputs.split_off(input_slots.len());
        Ok(AllocatedBuffers { inputs, outputs })
    }
}
