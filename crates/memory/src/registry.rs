//! Buffer registry
//!
//! The registry is the only component that creates or frees buffers. It
//! stamps every buffer with its integrity tag, keeps it in a pool until it is
//! deleted, and releases whatever is left when the runtime shuts down.
//!
//! # Thread Safety
//!
//! One mutex covers both the backend and the pool. Every create, delete and
//! shutdown runs entirely under that lock, so the pool never disagrees with
//! what the backend has handed out.
//!
//! ## Integrity policy
//!
//! A tag mismatch on delete is reported but does not stop the delete: the
//! buffer is still removed from the pool and its memory is still released.

use crate::allocator::{Allocator, AllocatorKind};
use crate::buffer::{Buffer, BufferKind, CachePolicy, NativeDescriptor};
use nerve_core::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Buffers force-released per shutdown before giving up.
pub const DEFAULT_SHUTDOWN_RETRY_LIMIT: usize = 100;

struct RegistryState {
    backend: Option<Box<dyn Allocator>>,
    pool: Vec<Arc<Buffer>>,
}

/// Owner of every live buffer.
pub struct BufferRegistry {
    state: Mutex<RegistryState>,
    retry_limit: usize,
}

impl BufferRegistry {
    /// Create a registry over a backend of the given kind.
    pub fn new(kind: AllocatorKind, memory_limit: Option<usize>) -> Self {
        tracing::debug!(backend = %kind, ?memory_limit, "buffer registry initialized");
        Self::with_backend(kind.create(memory_limit))
    }

    /// Create a registry over an explicit backend.
    pub fn with_backend(backend: Box<dyn Allocator>) -> Self {
        BufferRegistry {
            state: Mutex::new(RegistryState {
                backend: Some(backend),
                pool: Vec::new(),
            }),
            retry_limit: DEFAULT_SHUTDOWN_RETRY_LIMIT,
        }
    }

    /// Override how many leftover buffers shutdown will force-release.
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Allocate a new primary (or heap) buffer of `size` bytes.
    pub fn create(&self, size: usize, cache: CachePolicy) -> Result<Arc<Buffer>> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "buffer size must be positive".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let backend = state.backend.as_mut().ok_or(Error::AllocatorUnavailable)?;
        let allocation = backend.allocate(size, cache)?;

        let buffer = Arc::new(
            Buffer::from_parts(
                allocation.backing,
                size,
                allocation.offset,
                allocation.kind,
                allocation.descriptor,
                cache,
            )
            .seal(),
        );
        tracing::debug!(
            address = format_args!("{:#x}", buffer.address()),
            size,
            descriptor = %buffer.descriptor(),
            "buffer created"
        );
        state.pool.push(Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Import memory owned elsewhere, identified by a native descriptor.
    pub fn create_from_native(
        &self,
        descriptor: NativeDescriptor,
        size: usize,
        offset: usize,
    ) -> Result<Arc<Buffer>> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "import size must be positive".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let backend = state.backend.as_mut().ok_or(Error::AllocatorUnavailable)?;
        let allocation = backend.import(descriptor, size, offset)?;

        let buffer = Arc::new(
            Buffer::from_parts(
                allocation.backing,
                size,
                allocation.offset,
                allocation.kind,
                allocation.descriptor,
                CachePolicy::Cached,
            )
            .seal(),
        );
        tracing::debug!(
            descriptor = %descriptor,
            size,
            offset,
            "buffer imported"
        );
        state.pool.push(Arc::clone(&buffer));
        Ok(buffer)
    }

    /// Create a view over `base[offset..offset + size]`.
    ///
    /// The view shares the base's memory. Deleting the view never releases
    /// that memory.
    pub fn create_view(&self, base: &Buffer, size: usize, offset: usize) -> Result<Arc<Buffer>> {
        if size == 0 {
            return Err(Error::InvalidArgument(
                "view size must be positive".to_string(),
            ));
        }
        if offset.checked_add(size).map_or(true, |end| end > base.size()) {
            return Err(Error::OutOfBounds {
                at: offset,
                len: size,
                size: base.size(),
            });
        }

        let mut state = self.state.lock();
        if state.backend.is_none() {
            return Err(Error::AllocatorUnavailable);
        }

        let buffer = Arc::new(
            Buffer::from_parts(
                Arc::clone(&base.backing),
                size,
                base.offset() + offset,
                BufferKind::ClonedView,
                base.descriptor(),
                base.cache_policy(),
            )
            .seal(),
        );
        state.pool.push(Arc::clone(&buffer));
        Ok(buffer)
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Remove `buffer` from the pool and release its memory.
    ///
    /// Returns [`Error::TagMismatch`] if the integrity check failed; the
    /// buffer has been released regardless. Deleting a buffer that is not in
    /// the pool does nothing and returns [`Error::BufferNotRegistered`].
    pub fn delete(&self, buffer: &Arc<Buffer>) -> Result<()> {
        let mut state = self.state.lock();

        let position = match state.pool.iter().position(|b| Arc::ptr_eq(b, buffer)) {
            Some(position) => position,
            None => {
                tracing::warn!(
                    address = format_args!("{:#x}", buffer.address()),
                    "delete of unregistered buffer ignored"
                );
                return Err(Error::BufferNotRegistered(buffer.address()));
            }
        };

        let tag_ok = buffer.verify_tag();
        if !tag_ok {
            tracing::warn!(
                address = format_args!("{:#x}", buffer.address()),
                size = buffer.size(),
                offset = buffer.offset(),
                tag = buffer.tag(),
                "buffer integrity tag mismatch; releasing anyway"
            );
        }

        let buffer = state.pool.swap_remove(position);
        let released = Self::release_locked(&mut state, &buffer);
        buffer.mark_freed();
        released?;

        if tag_ok {
            Ok(())
        } else {
            Err(Error::TagMismatch {
                address: buffer.address(),
            })
        }
    }

    fn release_locked(state: &mut RegistryState, buffer: &Buffer) -> Result<()> {
        if buffer.kind() == BufferKind::ClonedView {
            return Ok(());
        }
        match state.backend.as_mut() {
            Some(backend) => backend.release(buffer),
            None => Err(Error::AllocatorUnavailable),
        }
    }

    /// Release every remaining buffer and drop the backend.
    ///
    /// At most the configured retry limit of buffers is force-released; the
    /// rest are dropped from the pool with a warning. Returns the number of
    /// buffers that were still live.
    pub fn shutdown(&self) -> usize {
        let mut state = self.state.lock();
        let leftover = state.pool.len();
        if leftover > 0 {
            tracing::warn!(count = leftover, "releasing buffers still live at shutdown");
        }

        let mut attempts = 0;
        while attempts < self.retry_limit {
            let Some(buffer) = state.pool.pop() else {
                break;
            };
            attempts += 1;
            if let Err(e) = Self::release_locked(&mut state, &buffer) {
                tracing::warn!(
                    address = format_args!("{:#x}", buffer.address()),
                    error = %e,
                    "failed to release buffer at shutdown"
                );
            }
            buffer.mark_freed();
        }

        if !state.pool.is_empty() {
            tracing::warn!(
                count = state.pool.len(),
                retry_limit = self.retry_limit,
                "shutdown retry limit reached; abandoning remaining buffers"
            );
            for buffer in state.pool.drain(..) {
                buffer.mark_freed();
            }
        }

        if let Some(backend) = state.backend.take() {
            tracing::debug!(backend = backend.name(), "buffer registry shut down");
        }
        leftover
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Number of live buffers.
    pub fn pool_len(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Whether `buffer` is currently in the pool.
    pub fn contains(&self, buffer: &Arc<Buffer>) -> bool {
        self.state
            .lock()
            .pool
            .iter()
            .any(|b| Arc::ptr_eq(b, buffer))
    }

    /// Whether the registry still has a backend.
    pub fn is_active(&self) -> bool {
        self.state.lock().backend.is_some()
    }

    /// Bytes the backend currently has allocated.
    pub fn bytes_in_use(&self) -> usize {
        self.state
            .lock()
            .backend
            .as_ref()
            .map_or(0, |backend| backend.bytes_in_use())
    }

    /// Emit one debug line per live buffer.
    pub fn log_pool(&self) {
        let state = self.state.lock();
        for (i, buffer) in state.pool.iter().enumerate() {
            tracing::debug!(
                index = i,
                address = format_args!("{:#x}", buffer.address()),
                size = buffer.size(),
                offset = buffer.offset(),
                kind = ?buffer.kind(),
                descriptor = %buffer.descriptor(),
                "pooled buffer"
            );
        }
    }
}

impl Drop for BufferRegistry {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.pool.is_empty() {
            tracing::warn!(count = state.pool.len(), "buffer registry dropped with live buffers");
        }
    }
}

impl std::fmt::Debug for BufferRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferRegistry")
            .field("backend", &state.backend.as_ref().map(|b| b.name()))
            .field("pool_len", &state.pool.len())
            .finish()
    }
}
