//! In-process loopback dispatcher
//!
//! Model images are JSON [`ModelManifest`]s. Executing a committed execution
//! concatenates the bytes of its inputs (in slot order) and writes them,
//! repeated as needed, into every output. Inputs with no bytes produce
//! zeroed outputs.
//!
//! ## Id scheme
//!
//! Model ids are `n << 24` for the n-th opened model. Execution ids are
//! `model_id | seq` with a per-model sequence starting at 1, so
//! [`ExecutionId::model_component`] recovers the model.

use crate::dispatch::Dispatcher;
use nerve_core::{
    BufferSlot, Direction, Error, ExecutionId, ModelId, Region, Result, Session, MODEL_ID_MASK,
};
use nerve_memory::Buffer;
use nerve_session::Execution;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const MODEL_SHIFT: u32 = 24;

/// Layout description stored in a loopback model image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Model name
    #[serde(default)]
    pub name: String,
    /// Memory regions, `index` must equal position
    pub regions: Vec<Region>,
    /// Caller-visible slots
    pub slots: Vec<BufferSlot>,
    /// Reject the model as unsupported on this device
    #[serde(default)]
    pub filtered: bool,
}

impl ModelManifest {
    /// Serialize into a model image.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Internal(e.to_string()))
    }

    /// Parse a model image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Dispatch(format!("malformed model image: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        for (position, region) in self.regions.iter().enumerate() {
            if region.index != position {
                return Err(Error::Dispatch(format!(
                    "region at position {} declares index {}",
                    position, region.index
                )));
            }
        }
        for slot in &self.slots {
            if slot.region_index >= self.regions.len() {
                return Err(Error::Dispatch(format!(
                    "slot {:?} maps to missing region {}",
                    slot.name, slot.region_index
                )));
            }
        }
        Ok(())
    }
}

struct LoopbackModel {
    session: Session,
    next_seq: u64,
}

struct CommittedExecution {
    inputs: Vec<Arc<Buffer>>,
    outputs: Vec<Arc<Buffer>>,
}

#[derive(Default)]
struct LoopbackState {
    initialized: bool,
    next_model: u64,
    models: FxHashMap<ModelId, LoopbackModel>,
    executions: FxHashMap<ExecutionId, Arc<CommittedExecution>>,
}

/// Dispatcher that runs everything in-process.
pub struct LoopbackDispatcher {
    state: Mutex<LoopbackState>,
    latency: Option<Duration>,
    executed: AtomicU64,
}

impl LoopbackDispatcher {
    /// Create a dispatcher with no simulated latency.
    pub fn new() -> Self {
        LoopbackDispatcher {
            state: Mutex::new(LoopbackState::default()),
            latency: None,
            executed: AtomicU64::new(0),
        }
    }

    /// Sleep for `latency` inside every execute.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of successful executes so far.
    pub fn executed_count(&self) -> u64 {
        self.executed.load(Ordering::SeqCst)
    }

    /// Number of models currently open.
    pub fn open_model_count(&self) -> usize {
        self.state.lock().models.len()
    }
}

impl Default for LoopbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for LoopbackDispatcher {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn init(&self) -> Result<()> {
        self.state.lock().initialized = true;
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.models.is_empty() {
            tracing::warn!(count = state.models.len(), "loopback deinit with open models");
        }
        state.models.clear();
        state.executions.clear();
        state.initialized = false;
        Ok(())
    }

    fn open_model(&self, model: &Buffer) -> Result<Session> {
        let manifest = ModelManifest::from_bytes(&model.to_vec()?)?;
        manifest.validate()?;
        if manifest.filtered {
            return Err(Error::Filtered(format!(
                "model {:?} is not supported by the loopback device",
                manifest.name
            )));
        }

        let mut state = self.state.lock();
        if !state.initialized {
            return Err(Error::Dispatch("loopback dispatcher not initialized".to_string()));
        }
        state.next_model += 1;
        let model_id = ModelId::new(state.next_model << MODEL_SHIFT);
        if model_id.as_u64() & MODEL_ID_MASK != model_id.as_u64() || !model_id.is_valid() {
            return Err(Error::Dispatch("model id space exhausted".to_string()));
        }

        let session = Session::new(model_id, manifest.slots, manifest.regions);
        state.models.insert(
            model_id,
            LoopbackModel {
                session: session.clone(),
                next_seq: 1,
            },
        );
        tracing::debug!(model_id = %model_id, name = %manifest.name, "loopback model opened");
        Ok(session)
    }

    fn close_model(&self, model_id: ModelId) -> Result<()> {
        let mut state = self.state.lock();
        if state.models.remove(&model_id).is_none() {
            return Err(Error::Dispatch(format!("model {} is not open", model_id)));
        }
        state
            .executions
            .retain(|id, _| id.model_component() != model_id);
        Ok(())
    }

    fn commit_execution(&self, model_id: ModelId, execution: &Execution) -> Result<ExecutionId> {
        let mut state = self.state.lock();
        let model = state
            .models
            .get_mut(&model_id)
            .ok_or_else(|| Error::Dispatch(format!("model {} is not open", model_id)))?;

        let buffer_for = |slot: &BufferSlot| -> Result<Arc<Buffer>> {
            execution
                .binding(slot.region_index)
                .map(|binding| Arc::clone(binding.buffer()))
                .ok_or_else(|| {
                    Error::Dispatch(format!("region {} is unbound", slot.region_index))
                })
        };
        let inputs = model
            .session
            .slots_of(Direction::In)
            .into_iter()
            .map(buffer_for)
            .collect::<Result<Vec<_>>>()?;
        let outputs = model
            .session
            .slots_of(Direction::Out)
            .into_iter()
            .map(buffer_for)
            .collect::<Result<Vec<_>>>()?;

        let seq = model.next_seq;
        if seq > !MODEL_ID_MASK {
            return Err(Error::Dispatch(format!(
                "execution ids exhausted for model {}",
                model_id
            )));
        }
        model.next_seq += 1;
        let id = ExecutionId::new(model_id.as_u64() | seq);
        state
            .executions
            .insert(id, Arc::new(CommittedExecution { inputs, outputs }));
        Ok(id)
    }

    fn execute(&self, execution_id: ExecutionId) -> Result<()> {
        let committed = self
            .state
            .lock()
            .executions
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| {
                Error::Dispatch(format!("execution {} is not committed", execution_id))
            })?;

        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }

        let mut payload = Vec::new();
        for input in &committed.inputs {
            payload.extend(input.to_vec()?);
        }
        for output in &committed.outputs {
            let bytes: Vec<u8> = if payload.is_empty() {
                vec![0; output.size()]
            } else {
                payload.iter().copied().cycle().take(output.size()).collect()
            };
            output.write(0, &bytes)?;
        }

        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for LoopbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackDispatcher")
            .field("open_models", &self.open_model_count())
            .field("executed", &self.executed_count())
            .finish()
    }
}
