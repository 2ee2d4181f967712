//! # Nerve
//!
//! On-device neural-network runtime core.
//!
//! Nerve lets an application open a compiled model, bind memory buffers to
//! its inputs and outputs, and run it on a compute backend reached through a
//! [`Dispatcher`]. It owns the buffer allocator (with integrity tagging), the
//! per-model session and commit state machine, and the bookkeeping for
//! asynchronous executions.
//!
//! ## Quick Start
//!
//! ```ignore
//! use nerve::prelude::*;
//!
//! let runtime = Runtime::open()?;
//! let model = runtime.open_model(Path::new("model.nnc"))?;
//!
//! let input = runtime.allocate_buffer(100)?;
//! let output = runtime.allocate_buffer(50)?;
//! runtime.bind_by_index(model, 0, Direction::In, 0, &input)?;
//! runtime.bind_by_index(model, 0, Direction::Out, 0, &output)?;
//! runtime.commit(model, 0)?;
//! runtime.execute(model, 0)?;
//!
//! runtime.close_model(model)?;
//! runtime.release_buffers(&[input, output])?;
//! runtime.close()?;
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Open** - load the model image, learn its slot layout
//! 2. **Bind** - attach buffers to slots (EXT scratch regions are optional)
//! 3. **Commit** - allocate missing scratch, verify, get an execution id
//! 4. **Execute** - synchronously, or `execute_async` then `wait`
//! 5. **Close** - flush pending work, release runtime-owned buffers
//!
//! ## Crates
//!
//! - [`nerve_core`] - ids, layout types, errors
//! - [`nerve_memory`] - buffers, allocator backends, registry
//! - [`nerve_session`] - per-model session store
//! - [`nerve_concurrency`] - async execution registry
//! - [`nerve_engine`] - process context and client operations

#![warn(missing_docs)]

mod error;
mod runtime;

pub mod logging;
pub mod prelude;

// Re-export main entry points
pub use error::{Error, ErrorKind, Result, ReturnCode};
pub use runtime::{Runtime, RuntimeBuilder};

// Re-export engine surface
pub use nerve_engine::{
    AllocatedBuffers, ContextOptions, Dispatcher, LoopbackDispatcher, ModelManifest, ModelSource,
    ProcessContext,
};

// Re-export workspace crates
pub use nerve_concurrency;
pub use nerve_core;
pub use nerve_engine;
pub use nerve_memory;
pub use nerve_session;
