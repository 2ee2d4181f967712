//! Asynchronous execution tracking for the nerve runtime
//!
//! This crate implements:
//! - [`AsyncExecutionRegistry`]: the map of in-flight executions, keyed by
//!   execution id, plus the worker pool they run on
//! - [`PendingExecution`]: a deferred result consumed exactly once

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pending;
pub mod registry;

pub use pending::PendingExecution;
pub use registry::{AsyncExecutionRegistry, DEFAULT_ASYNC_WORKERS};
