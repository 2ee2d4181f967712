//! Host heap backend

use super::{check_budget, Allocation, Allocator};
use crate::buffer::{Buffer, BufferKind, CachePolicy, MappedRegion, NativeDescriptor};
use nerve_core::{Error, Result};

/// Plain host memory. Has no native descriptors, so import is unsupported.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    limit: Option<usize>,
    in_use: usize,
}

impl HeapAllocator {
    /// Create a heap backend with an optional byte budget.
    pub fn new(limit: Option<usize>) -> Self {
        HeapAllocator { limit, in_use: 0 }
    }
}

impl Allocator for HeapAllocator {
    fn name(&self) -> &'static str {
        "heap"
    }

    fn allocate(&mut self, size: usize, _cache: CachePolicy) -> Result<Allocation> {
        check_budget(self.limit, self.in_use, size)?;
        self.in_use += size;
        Ok(Allocation {
            backing: MappedRegion::zeroed(size),
            descriptor: NativeDescriptor::NONE,
            kind: BufferKind::HostHeap,
            offset: 0,
        })
    }

    fn import(
        &mut self,
        _descriptor: NativeDescriptor,
        _size: usize,
        _offset: usize,
    ) -> Result<Allocation> {
        Err(Error::ImportUnsupported)
    }

    fn release(&mut self, buffer: &Buffer) -> Result<()> {
        self.in_use = self.in_use.saturating_sub(buffer.size());
        Ok(())
    }

    fn bytes_in_use(&self) -> usize {
        self.in_use
    }
}
