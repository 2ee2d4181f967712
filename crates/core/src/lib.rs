//! Core types for the nerve runtime
//!
//! This crate defines the vocabulary shared by every other nerve crate:
//! - [`ModelId`], [`ExecutionId`], [`SessionId`]: identifiers handed out by the
//!   dispatch layer and used as map keys throughout the runtime
//! - [`Region`], [`BufferSlot`], [`Session`]: the immutable memory layout of an
//!   opened model
//! - [`Error`], [`ErrorKind`], [`ReturnCode`]: the single error type and its
//!   projection onto the closed client result-code set

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod layout;
pub mod types;

pub use error::{Error, ErrorKind, Result, ReturnCode};
pub use layout::{
    BufferCounts, BufferInfo, BufferSlot, Direction, Region, Session, Shape, SlotSelector,
};
pub use types::{ExecutionId, ModelId, SessionId, MODEL_ID_MASK};
