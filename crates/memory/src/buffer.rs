//! Buffers handed out by the registry
//!
//! A [`Buffer`] is an immutable description of a span of backend memory plus
//! a shared handle on the bytes themselves ([`MappedRegion`]). Several buffers
//! may share one region: a cloned view aliases its base, and an imported
//! descriptor aliases the primary allocation it was exported from.
//!
//! Buffers are reference counted by the caller (`Arc<Buffer>`) but only the
//! registry frees them. After a delete the status flips to
//! [`BufferStatus::Freed`] and byte access fails, even if handles remain.

use crate::tag::integrity_tag;
use nerve_core::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// How a buffer came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Allocated by the device backend
    Primary,
    /// Imported from a native descriptor
    ImportedExternal,
    /// Sub-range view of another buffer
    ClonedView,
    /// Allocated on the host heap
    HostHeap,
}

/// Mapping state of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BufferStatus {
    /// Created but not yet visible to the caller
    Unmapped = 0,
    /// Live and accessible
    Mapped = 1,
    /// Released through the registry
    Freed = 2,
}

impl BufferStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => BufferStatus::Unmapped,
            1 => BufferStatus::Mapped,
            _ => BufferStatus::Freed,
        }
    }
}

/// CPU cache policy requested at allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Cached mapping
    #[default]
    Cached,
    /// Uncached mapping
    Uncached,
}

/// Native handle of backend memory (a file-descriptor-like integer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeDescriptor(i32);

impl NativeDescriptor {
    /// No native handle (heap memory).
    pub const NONE: NativeDescriptor = NativeDescriptor(-1);

    /// Wrap a raw handle.
    pub const fn new(raw: i32) -> Self {
        NativeDescriptor(raw)
    }

    /// Raw handle value.
    pub const fn as_raw(&self) -> i32 {
        self.0
    }

    /// Whether this names a real handle.
    pub const fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for NativeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backing bytes shared by every buffer that aliases them.
#[derive(Debug)]
pub struct MappedRegion {
    base_address: u64,
    bytes: Mutex<Box<[u8]>>,
}

impl MappedRegion {
    /// Allocate a zeroed region.
    pub fn zeroed(size: usize) -> Arc<Self> {
        let bytes = vec![0u8; size].into_boxed_slice();
        let base_address = bytes.as_ptr() as u64;
        Arc::new(MappedRegion {
            base_address,
            bytes: Mutex::new(bytes),
        })
    }

    /// Address of the first byte.
    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    /// Whether the region has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A tagged span of backend memory.
#[derive(Debug)]
pub struct Buffer {
    pub(crate) address: u64,
    pub(crate) size: usize,
    pub(crate) offset: usize,
    pub(crate) tag: u32,
    pub(crate) kind: BufferKind,
    pub(crate) descriptor: NativeDescriptor,
    pub(crate) cache: CachePolicy,
    pub(crate) status: AtomicU8,
    pub(crate) backing: Arc<MappedRegion>,
}

impl Buffer {
    /// Build an untagged, unmapped buffer over `backing[offset..offset + size]`.
    pub(crate) fn from_parts(
        backing: Arc<MappedRegion>,
        size: usize,
        offset: usize,
        kind: BufferKind,
        descriptor: NativeDescriptor,
        cache: CachePolicy,
    ) -> Self {
        Buffer {
            address: backing.base_address() + offset as u64,
            size,
            offset,
            tag: 0,
            kind,
            descriptor,
            cache,
            status: AtomicU8::new(BufferStatus::Unmapped as u8),
            backing,
        }
    }

    /// Stamp the integrity tag and mark the buffer mapped.
    pub(crate) fn seal(mut self) -> Self {
        self.tag = integrity_tag(self.address, self.size, self.offset);
        self.status
            .store(BufferStatus::Mapped as u8, Ordering::Release);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Address of the first byte of this buffer.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Offset of this buffer inside its backing region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Integrity tag stamped at creation.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// How the buffer was created.
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Native handle; [`NativeDescriptor::NONE`] for heap memory.
    pub fn descriptor(&self) -> NativeDescriptor {
        self.descriptor
    }

    /// Cache policy.
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache
    }

    /// Current status.
    pub fn status(&self) -> BufferStatus {
        BufferStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Whether the stored tag still matches the buffer identity.
    pub fn verify_tag(&self) -> bool {
        self.tag == integrity_tag(self.address, self.size, self.offset)
    }

    /// Whether `other` aliases the same backing bytes.
    pub fn shares_memory_with(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.backing, &other.backing)
    }

    pub(crate) fn mark_freed(&self) {
        self.status.store(BufferStatus::Freed as u8, Ordering::Release);
    }

    // ========================================================================
    // Byte access
    // ========================================================================

    fn check_access(&self, at: usize, len: usize) -> Result<()> {
        if self.status() == BufferStatus::Freed {
            return Err(Error::BufferNotRegistered(self.address));
        }
        match at.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::OutOfBounds {
                at,
                len,
                size: self.size,
            }),
        }
    }

    /// Copy `data` into the buffer starting at `at`.
    pub fn write(&self, at: usize, data: &[u8]) -> Result<()> {
        self.check_access(at, data.len())?;
        let start = self.offset + at;
        let mut bytes = self.backing.bytes.lock();
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy bytes starting at `at` into `out`.
    pub fn read(&self, at: usize, out: &mut [u8]) -> Result<()> {
        self.check_access(at, out.len())?;
        let start = self.offset + at;
        let bytes = self.backing.bytes.lock();
        out.copy_from_slice(&bytes[start..start + out.len()]);
        Ok(())
    }

    /// Copy the whole buffer out.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size];
        self.read(0, &mut out)?;
        Ok(out)
    }

    /// Set every byte of the buffer to `value`.
    pub fn fill(&self, value: u8) -> Result<()> {
        self.check_access(0, self.size)?;
        let mut bytes = self.backing.bytes.lock();
        bytes[self.offset..self.offset + self.size].fill(value);
        Ok(())
    }
}
