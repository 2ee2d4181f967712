//! Engine layer for the nerve runtime
//!
//! This crate ties the memory, session and concurrency layers together
//! behind a [`ProcessContext`] and implements every client operation on it:
//! opening models, binding buffers, committing and executing (synchronously
//! or on the async pool) and closing.
//!
//! The hardware side is abstracted by the [`Dispatcher`] trait.
//! [`LoopbackDispatcher`] is an in-process implementation that reads a JSON
//! layout manifest from the model image and "executes" by echoing input bytes
//! into the outputs.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod dispatch;
pub mod ops;

pub use config::ContextOptions;
pub use context::ProcessContext;
pub use dispatch::loopback::{LoopbackDispatcher, ModelManifest};
pub use dispatch::Dispatcher;
pub use ops::{AllocatedBuffers, ModelSource};
