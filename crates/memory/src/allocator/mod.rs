//! Allocator backends
//!
//! The registry talks to memory through the [`Allocator`] trait. Two
//! backends exist:
//! - [`DeviceAllocator`]: descriptor-backed memory that other components can
//!   import by handle (the platform default on Android)
//! - [`HeapAllocator`]: plain host memory with no descriptors and no import
//!
//! [`AllocatorKind`] picks one at registry construction.

mod device;
mod heap;

pub use device::DeviceAllocator;
pub use heap::HeapAllocator;

use crate::buffer::{Buffer, BufferKind, CachePolicy, MappedRegion, NativeDescriptor};
use nerve_core::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Memory handed back by a backend, before the registry tags it.
#[derive(Debug)]
pub struct Allocation {
    /// Backing bytes
    pub backing: Arc<MappedRegion>,
    /// Native handle, or [`NativeDescriptor::NONE`]
    pub descriptor: NativeDescriptor,
    /// Kind the resulting buffer should report
    pub kind: BufferKind,
    /// Offset of the usable span inside `backing`
    pub offset: usize,
}

/// Memory backend capability.
///
/// Backends are driven only through the registry lock, so methods take
/// `&mut self`.
pub trait Allocator: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Allocate `size` zeroed bytes.
    fn allocate(&mut self, size: usize, cache: CachePolicy) -> Result<Allocation>;

    /// Map memory identified by `descriptor` without copying.
    fn import(
        &mut self,
        descriptor: NativeDescriptor,
        size: usize,
        offset: usize,
    ) -> Result<Allocation>;

    /// Return the memory behind `buffer` to the backend.
    fn release(&mut self, buffer: &Buffer) -> Result<()>;

    /// Bytes currently allocated through this backend.
    fn bytes_in_use(&self) -> usize;
}

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// Descriptor-backed device memory
    Device,
    /// Host heap memory
    Heap,
}

impl AllocatorKind {
    /// Device on Android, heap everywhere else.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "android") {
            AllocatorKind::Device
        } else {
            AllocatorKind::Heap
        }
    }

    /// Build a backend of this kind.
    ///
    /// `memory_limit` caps the bytes the backend will hand out at once.
    pub fn create(self, memory_limit: Option<usize>) -> Box<dyn Allocator> {
        match self {
            AllocatorKind::Device => Box::new(DeviceAllocator::new(memory_limit)),
            AllocatorKind::Heap => Box::new(HeapAllocator::new(memory_limit)),
        }
    }
}

impl Default for AllocatorKind {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl std::fmt::Display for AllocatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocatorKind::Device => write!(f, "device"),
            AllocatorKind::Heap => write!(f, "heap"),
        }
    }
}

/// Enforce an optional byte budget.
pub(crate) fn check_budget(limit: Option<usize>, in_use: usize, size: usize) -> Result<()> {
    if let Some(limit) = limit {
        if in_use.saturating_add(size) > limit {
            return Err(nerve_core::Error::AllocationFailed {
                size,
                reason: format!("memory limit {} bytes reached ({} in use)", limit, in_use),
            });
        }
    }
    Ok(())
}
