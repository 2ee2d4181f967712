//! Executions and their region bindings
//!
//! An [`Execution`] holds one optional [`RegionBinding`] per model region.
//! Binding is only possible before commit; once the dispatch layer assigns an
//! execution id the bindings are frozen until the set is regenerated.
//!
//! ```text
//!   Empty ──bind──► Bound ──commit──► Committed
//!     ▲               │ ▲                 │
//!     │               └─┘ bind            │
//!     └───────────── generate ◄───────────┘
//! ```

use nerve_core::ExecutionId;
use nerve_memory::{Buffer, NativeDescriptor};
use std::sync::Arc;

/// Snapshot of the buffer bound to a region.
#[derive(Debug, Clone)]
pub struct RegionBinding {
    /// Buffer address at bind time
    pub address: u64,
    /// Buffer native handle
    pub descriptor: NativeDescriptor,
    /// Buffer size
    pub size: usize,
    /// Buffer offset in its backing memory
    pub offset: usize,
    buffer: Arc<Buffer>,
}

impl RegionBinding {
    /// Snapshot `buffer`.
    pub fn new(buffer: &Arc<Buffer>) -> Self {
        RegionBinding {
            address: buffer.address(),
            descriptor: buffer.descriptor(),
            size: buffer.size(),
            offset: buffer.offset(),
            buffer: Arc::clone(buffer),
        }
    }

    /// The bound buffer.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }
}

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// No region bound
    Empty,
    /// At least one region bound, not committed
    Bound,
    /// Committed to the dispatch layer
    Committed,
}

/// One bindable instance of a model.
#[derive(Debug, Clone)]
pub struct Execution {
    bindings: Vec<Option<RegionBinding>>,
    execution_id: ExecutionId,
    committing: bool,
    committed: bool,
}

impl Execution {
    /// Fresh execution over `region_count` regions.
    pub fn new(region_count: usize) -> Self {
        Execution {
            bindings: vec![None; region_count],
            execution_id: ExecutionId::UNASSIGNED,
            committing: false,
            committed: false,
        }
    }

    /// Number of regions in the layout.
    pub fn region_count(&self) -> usize {
        self.bindings.len()
    }

    /// Binding for `region_index`, if bound.
    pub fn binding(&self, region_index: usize) -> Option<&RegionBinding> {
        self.bindings.get(region_index).and_then(|b| b.as_ref())
    }

    /// All binding slots, indexed by region.
    pub fn bindings(&self) -> &[Option<RegionBinding>] {
        &self.bindings
    }

    /// Number of regions with a binding.
    pub fn bound_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }

    /// Assigned execution id, or [`ExecutionId::UNASSIGNED`].
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Whether the execution has been committed.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Whether a commit has verified the bindings and not yet finished.
    ///
    /// Bindings of a frozen execution cannot change.
    pub fn is_frozen(&self) -> bool {
        self.committing
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ExecutionState {
        if self.committed {
            ExecutionState::Committed
        } else if self.bound_count() > 0 {
            ExecutionState::Bound
        } else {
            ExecutionState::Empty
        }
    }

    pub(crate) fn bind(&mut self, region_index: usize, binding: RegionBinding) {
        self.bindings[region_index] = Some(binding);
        self.execution_id = ExecutionId::UNASSIGNED;
    }

    pub(crate) fn unbind(&mut self, region_index: usize) {
        if let Some(slot) = self.bindings.get_mut(region_index) {
            *slot = None;
        }
    }

    pub(crate) fn freeze(&mut self) {
        self.committing = true;
    }

    pub(crate) fn thaw(&mut self) {
        self.committing = false;
    }

    pub(crate) fn assign(&mut self, id: ExecutionId) {
        self.execution_id = id;
        self.committing = false;
        self.committed = true;
    }
}

/// The executions generated for one model.
#[derive(Debug, Clone)]
pub struct ExecutionSet {
    executions: Vec<Execution>,
}

impl ExecutionSet {
    /// `count` fresh executions over `region_count` regions.
    pub fn new(count: usize, region_count: usize) -> Self {
        ExecutionSet {
            executions: (0..count).map(|_| Execution::new(region_count)).collect(),
        }
    }

    /// Number of executions.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Execution at `session_id`.
    pub fn get(&self, session_id: usize) -> Option<&Execution> {
        self.executions.get(session_id)
    }

    pub(crate) fn get_mut(&mut self, session_id: usize) -> Option<&mut Execution> {
        self.executions.get_mut(session_id)
    }
}
