//! Open, close and layout queries

use super::guard::BufferGuard;
use crate::context::ProcessContext;
use nerve_core::{
    BufferCounts, BufferInfo, Direction, Error, ModelId, Result, SessionId, SlotSelector,
};
use nerve_memory::CachePolicy;
use std::path::{Path, PathBuf};

/// Where a model image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Read the image from a file
    File(PathBuf),
    /// Image already in memory
    Memory(Vec<u8>),
}

impl From<&Path> for ModelSource {
    fn from(path: &Path) -> Self {
        ModelSource::File(path.to_path_buf())
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::File(path)
    }
}

impl From<Vec<u8>> for ModelSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModelSource::Memory(bytes)
    }
}

impl From<&[u8]> for ModelSource {
    fn from(bytes: &[u8]) -> Self {
        ModelSource::Memory(bytes.to_vec())
    }
}

impl ProcessContext {
    /// Load a model image and register its layout.
    ///
    /// The image is copied into a registry buffer that stays alive until the
    /// model is closed. Any failure releases that buffer.
    pub fn open_model(&self, source: impl Into<ModelSource>) -> Result<ModelId> {
        let components = self.components()?;
        let bytes = match source.into() {
            ModelSource::File(path) => std::fs::read(&path).map_err(|e| {
                Error::Io(format!("failed to read model {}: {}", path.display(), e))
            })?,
            ModelSource::Memory(bytes) => bytes,
        };
        if bytes.is_empty() {
            return Err(Error::InvalidArgument("model image is empty".to_string()));
        }

        let mut guard = BufferGuard::new(&components.registry);
        let loaded = components.registry.create(bytes.len(), CachePolicy::Cached)?;
        guard.push(loaded.clone());
        loaded.write(0, &bytes)?;

        let session = self.dispatcher.open_model(&loaded)?;
        let model_id = session.model_id;
        let counts = session.buffer_counts();
        if let Err(e) = components.store.set_session(session, Some(loaded)) {
            if let Err(close_err) = self.dispatcher.close_model(model_id) {
                tracing::error!(
                    model_id = %model_id,
                    error = %close_err,
                    "dispatcher close failed during rollback"
                );
            }
            return Err(e);
        }
        guard.disarm();

        tracing::info!(
            model_id = %model_id,
            inputs = counts.inputs,
            outputs = counts.outputs,
            "model opened"
        );
        Ok(model_id)
    }

    /// Close a model.
    ///
    /// Waits out its pending async executions, closes it in the dispatch
    /// layer, releases its loaded and auto-allocated buffers and forgets its
    /// session. Cleanup continues past individual failures; the first one is
    /// returned.
    pub fn close_model(&self, model_id: ModelId) -> Result<()> {
        let components = self.components()?;
        let loaded = components.store.loaded_buffer(model_id)?;

        let drained = components.async_registry.drain_for(model_id);
        if drained > 0 {
            tracing::warn!(
                model_id = %model_id,
                count = drained,
                "flushed async executions at close"
            );
        }

        let mut first_error: Option<Error> = None;
        let mut note = |result: Result<()>| {
            if let Err(e) = result {
                tracing::warn!(model_id = %model_id, error = %e, "close step failed");
                first_error.get_or_insert(e);
            }
        };

        note(self.dispatcher.close_model(model_id));
        if let Some(loaded) = loaded {
            note(components.registry.delete(&loaded));
        }
        for buffer in components.store.take_all_auto_allocated(model_id)? {
            note(components.registry.delete(&buffer));
        }
        note(components.store.clear_model(model_id));

        tracing::info!(model_id = %model_id, "model closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Replace the model's executions with `count` fresh ones.
    pub fn generate_buffer_space(&self, model_id: ModelId, count: usize) -> Result<()> {
        self.components()?
            .store
            .generate_executions(model_id, count)
    }

    /// Number of generated executions.
    pub fn execution_count(&self, model_id: ModelId) -> Result<usize> {
        self.components()?.store.execution_count(model_id)
    }

    /// IN and OUT slot counts.
    pub fn buffer_counts(&self, model_id: ModelId) -> Result<BufferCounts> {
        self.components()?.store.buffer_counts(model_id)
    }

    /// Description of the `index`-th slot of `direction`.
    pub fn buffer_info_by_index(
        &self,
        model_id: ModelId,
        direction: Direction,
        index: usize,
    ) -> Result<BufferInfo> {
        self.components()?
            .store
            .buffer_info(model_id, &SlotSelector::Index(direction, index))
    }

    /// Description of the slot labelled `label`.
    pub fn buffer_info_by_label(&self, model_id: ModelId, label: &str) -> Result<BufferInfo> {
        self.components()?
            .store
            .buffer_info(model_id, &SlotSelector::label(label))
    }

    /// Snapshot of one execution's bindings and commit state.
    pub fn execution(
        &self,
        model_id: ModelId,
        session_id: SessionId,
    ) -> Result<nerve_session::Execution> {
        self.components()?.store.execution(model_id, session_id)
    }
}
