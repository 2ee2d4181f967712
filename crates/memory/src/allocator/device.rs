//! Descriptor-backed device backend
//!
//! Every primary allocation is published in an export table under a fresh
//! [`NativeDescriptor`]. Importing a descriptor maps the same region again,
//! so the importer and exporter see each other's writes without a copy.
//! The entry disappears when the primary buffer is released; imports taken
//! before that keep their bytes alive but can no longer be re-imported.

use super::{check_budget, Allocation, Allocator};
use crate::buffer::{Buffer, BufferKind, CachePolicy, MappedRegion, NativeDescriptor};
use nerve_core::{Error, Result};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// First descriptor handed out; 0..=2 mimic the standard streams.
const FIRST_DESCRIPTOR: i32 = 3;

/// Device memory with an export table for zero-copy import.
#[derive(Debug)]
pub struct DeviceAllocator {
    exports: FxHashMap<NativeDescriptor, Arc<MappedRegion>>,
    next_descriptor: i32,
    limit: Option<usize>,
    in_use: usize,
}

impl DeviceAllocator {
    /// Create a device backend with an optional byte budget.
    pub fn new(limit: Option<usize>) -> Self {
        DeviceAllocator {
            exports: FxHashMap::default(),
            next_descriptor: FIRST_DESCRIPTOR,
            limit,
            in_use: 0,
        }
    }

    /// Number of live exported descriptors.
    pub fn export_count(&self) -> usize {
        self.exports.len()
    }
}

impl Allocator for DeviceAllocator {
    fn name(&self) -> &'static str {
        "device"
    }

    fn allocate(&mut self, size: usize, _cache: CachePolicy) -> Result<Allocation> {
        check_budget(self.limit, self.in_use, size)?;
        let descriptor = NativeDescriptor::new(self.next_descriptor);
        self.next_descriptor = self.next_descriptor.checked_add(1).ok_or_else(|| {
            Error::AllocationFailed {
                size,
                reason: "descriptor space exhausted".to_string(),
            }
        })?;

        let backing = MappedRegion::zeroed(size);
        self.exports.insert(descriptor, Arc::clone(&backing));
        self.in_use += size;

        Ok(Allocation {
            backing,
            descriptor,
            kind: BufferKind::Primary,
            offset: 0,
        })
    }

    fn import(
        &mut self,
        descriptor: NativeDescriptor,
        size: usize,
        offset: usize,
    ) -> Result<Allocation> {
        let backing = self
            .exports
            .get(&descriptor)
            .ok_or(Error::UnknownDescriptor(descriptor.as_raw()))?;

        let len = backing.len();
        if offset.checked_add(size).map_or(true, |end| end > len) {
            return Err(Error::OutOfBounds {
                at: offset,
                len: size,
                size: len,
            });
        }

        Ok(Allocation {
            backing: Arc::clone(backing),
            descriptor,
            kind: BufferKind::ImportedExternal,
            offset,
        })
    }

    fn release(&mut self, buffer: &Buffer) -> Result<()> {
        match buffer.kind() {
            BufferKind::Primary => {
                if self.exports.remove(&buffer.descriptor()).is_none() {
                    return Err(Error::UnknownDescriptor(buffer.descriptor().as_raw()));
                }
                self.in_use = self.in_use.saturating_sub(buffer.size());
                Ok(())
            }
            // The exporter owns the descriptor; dropping our mapping is enough.
            BufferKind::ImportedExternal => Ok(()),
            BufferKind::ClonedView | BufferKind::HostHeap => Err(Error::Internal(format!(
                "device backend asked to release {:?} buffer",
                buffer.kind()
            ))),
        }
    }

    fn bytes_in_use(&self) -> usize {
        self.in_use
    }
}
