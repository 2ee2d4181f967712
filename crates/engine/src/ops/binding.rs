//! Buffer binding
//!
//! Binding on session 0 of a model without executions generates a single
//! execution first. EXT slots are bound by label or left for commit to
//! allocate; they cannot be bound by index.

use crate::context::ProcessContext;
use nerve_core::{Direction, Error, ModelId, Result, SessionId, SlotSelector};
use nerve_memory::Buffer;
use std::sync::Arc;

impl ProcessContext {
    /// Bind `buffer` to the `index`-th IN or OUT slot.
    pub fn bind_by_index(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        direction: Direction,
        index: usize,
        buffer: &Arc<Buffer>,
    ) -> Result<()> {
        if direction == Direction::Ext {
            return Err(Error::DirectionNotBindable(direction));
        }
        self.bind_slot(
            model_id,
            session_id,
            &SlotSelector::Index(direction, index),
            buffer,
        )
    }

    /// Bind `buffer` to the slot labelled `label`. EXT slots are allowed.
    pub fn bind_by_label(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        label: &str,
        buffer: &Arc<Buffer>,
    ) -> Result<()> {
        self.bind_slot(model_id, session_id, &SlotSelector::label(label), buffer)
    }

    /// Bind every IN slot then every OUT slot, in index order.
    ///
    /// `buffers` must hold exactly inputs + outputs entries.
    pub fn bind_all(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        buffers: &[Arc<Buffer>],
    ) -> Result<()> {
        let components = self.components()?;
        let counts = components.store.buffer_counts(model_id)?;
        if buffers.len() != counts.total() {
            return Err(Error::InvalidArgument(format!(
                "bind_all expects {} buffers ({} in, {} out), got {}",
                counts.total(),
                counts.inputs,
                counts.outputs,
                buffers.len()
            )));
        }

        let (inputs, outputs) = buffers.split_at(counts.inputs);
        for (index, buffer) in inputs.iter().enumerate() {
            self.bind_slot(
                model_id,
                session_id,
                &SlotSelector::Index(Direction::In, index),
                buffer,
            )?;
        }
        for (index, buffer) in outputs.iter().enumerate() {
            self.bind_slot(
                model_id,
                session_id,
                &SlotSelector::Index(Direction::Out, index),
                buffer,
            )?;
        }
        Ok(())
    }

    pub(crate) fn bind_slot(
        &self,
        model_id: ModelId,
        session_id: SessionId,
        selector: &SlotSelector,
        buffer: &Arc<Buffer>,
    ) -> Result<()> {
        let components = self.components()?;
        components.store.ensure_executions(model_id, session_id)?;
        components
            .store
            .bind(model_id, session_id, selector, buffer)
            .map(|_| ())
    }
}
