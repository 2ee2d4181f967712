//! Memory layer for the nerve runtime
//!
//! This crate owns every buffer the runtime hands out:
//! - [`Buffer`]: a tagged view of backend memory with safe byte access
//! - [`Allocator`]: the backend capability, with a device allocator that
//!   supports zero-copy import and a plain heap allocator that does not
//! - [`BufferRegistry`]: the pool of live buffers, serialized by one lock

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod buffer;
pub mod registry;
pub mod tag;

pub use allocator::{Allocation, Allocator, AllocatorKind, DeviceAllocator, HeapAllocator};
pub use buffer::{Buffer, BufferKind, BufferStatus, CachePolicy, MappedRegion, NativeDescriptor};
pub use registry::{BufferRegistry, DEFAULT_SHUTDOWN_RETRY_LIMIT};
pub use tag::integrity_tag;
