//! Convenient imports for nerve.
//!
//! ```ignore
//! use nerve::prelude::*;
//!
//! let runtime = Runtime::open()?;
//! let model = runtime.open_model(image)?;
//! ```

// Main entry point
pub use crate::runtime::{Runtime, RuntimeBuilder};

// Error handling
pub use crate::error::{Error, ErrorKind, Result, ReturnCode};

// Identifiers and layout
pub use nerve_core::{
    BufferCounts, BufferInfo, Direction, ExecutionId, ModelId, SessionId, Shape, SlotSelector,
};

// Buffers
pub use nerve_memory::{AllocatorKind, Buffer, CachePolicy, NativeDescriptor};

// Engine
pub use nerve_engine::{
    AllocatedBuffers, ContextOptions, Dispatcher, LoopbackDispatcher, ModelManifest, ModelSource,
};

pub use std::sync::Arc;
