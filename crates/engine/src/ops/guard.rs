//! Scoped buffer cleanup

use nerve_memory::{Buffer, BufferRegistry};
use std::sync::Arc;

/// Deletes the buffers it holds when dropped, unless disarmed.
pub(crate) struct BufferGuard<'a> {
    registry: &'a BufferRegistry,
    buffers: Vec<Arc<Buffer>>,
}

impl<'a> BufferGuard<'a> {
    pub(crate) fn new(registry: &'a BufferRegistry) -> Self {
        BufferGuard {
            registry,
            buffers: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, buffer: Arc<Buffer>) {
        self.buffers.push(buffer);
    }

    pub(crate) fn held(&self) -> &[Arc<Buffer>] {
        &self.buffers
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Keep the buffers alive and hand them back.
    pub(crate) fn disarm(mut self) -> Vec<Arc<Buffer>> {
        std::mem::take(&mut self.buffers)
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            if let Err(e) = self.registry.delete(&buffer) {
                tracing::warn!(
                    address = format_args!("{:#x}", buffer.address()),
                    error = %e,
                    "failed to release buffer during rollback"
                );
            }
        }
    }
}
