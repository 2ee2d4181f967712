//! Session layer for the nerve runtime
//!
//! This crate tracks, per opened model:
//! - the immutable [`Session`](nerve_core::Session) layout and loaded-model buffer
//! - an [`ExecutionSet`] of [`Execution`]s, each moving through
//!   Empty → Bound → Committed
//! - the EXT buffers the runtime allocated on the caller's behalf
//!
//! All of it lives in one [`SessionStore`] behind a single lock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod execution;
pub mod store;

pub use execution::{Execution, ExecutionSet, ExecutionState, RegionBinding};
pub use store::SessionStore;
