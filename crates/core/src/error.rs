//! Error types for the nerve runtime
//!
//! Every fallible operation in every nerve crate returns [`Result`]. Errors
//! are grouped into five [`ErrorKind`]s and projected onto the closed
//! [`ReturnCode`] set that the client layer exposes.
//!
//! | Kind | Return code |
//! |------|-------------|
//! | Configuration | InvalidArgument |
//! | ProtocolViolation | GenericFailure |
//! | SizeMismatch | SizeError |
//! | Memory | MemoryError |
//! | Io | IoError |

use crate::layout::{Direction, SlotSelector};
use crate::types::{ExecutionId, ModelId, SessionId};
use thiserror::Error;

/// Result type for nerve operations.
pub type Result<T> = std::result::Result<T, Error>;

/// All nerve errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    /// Operation issued before the process context was acquired
    #[error("process context is not initialized")]
    ContextNotInitialized,

    /// Model id 0 or otherwise unusable
    #[error("invalid model id {0}")]
    InvalidModelId(ModelId),

    /// No session recorded for the model
    #[error("model {0} is not open")]
    ModelNotFound(ModelId),

    /// Model has no execution set and one cannot be generated implicitly
    #[error("model {model_id} has no generated executions for session {session_id}")]
    ExecutionsNotGenerated {
        /// Model
        model_id: ModelId,
        /// Requested session
        session_id: SessionId,
    },

    /// Session index beyond the generated execution count
    #[error("session {session_id} out of range for model {model_id} ({count} generated)")]
    SessionOutOfRange {
        /// Model
        model_id: ModelId,
        /// Requested session
        session_id: SessionId,
        /// Number of generated executions
        count: usize,
    },

    /// Requested execution count is zero
    #[error("execution count must be positive")]
    InvalidExecutionCount,

    /// Region index not present in the session layout
    #[error("region {0} not present in session layout")]
    RegionOutOfRange(usize),

    /// Caller argument rejected
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration value rejected or unparsable
    #[error("configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Protocol violations
    // ========================================================================
    /// Execution is already committed and accepts no further binding
    #[error("session {session_id} of model {model_id} is already committed")]
    AlreadyCommitted {
        /// Model
        model_id: ModelId,
        /// Session
        session_id: SessionId,
    },

    /// Selector matched no slot
    #[error("no buffer slot matches {0}")]
    SlotNotFound(SlotSelector),

    /// Slot has a nonzero offset inside its region
    #[error("slot {0} is a partial view of its region (offset {1})")]
    PartialBinding(SlotSelector, usize),

    /// Direction cannot be bound through this entry point
    #[error("{0} slots cannot be bound by index")]
    DirectionNotBindable(Direction),

    /// Execution already carries a nonzero execution id
    #[error("session {session_id} of model {model_id} already has execution id {existing}")]
    ExecutionIdAssigned {
        /// Model
        model_id: ModelId,
        /// Session
        session_id: SessionId,
        /// Id already held
        existing: ExecutionId,
    },

    /// Verification found regions with no binding
    #[error("{unbound} of {total} regions are unbound")]
    UnboundRegions {
        /// Regions without a binding
        unbound: usize,
        /// Regions in the layout
        total: usize,
    },

    /// Execution is being committed and its bindings are frozen
    #[error("session {session_id} of model {model_id} is being committed")]
    CommitInProgress {
        /// Model
        model_id: ModelId,
        /// Session
        session_id: SessionId,
    },

    /// Execution must be committed before this operation
    #[error("session {session_id} of model {model_id} is not committed")]
    NotCommitted {
        /// Model
        model_id: ModelId,
        /// Session
        session_id: SessionId,
    },

    /// An async execution with this id is already in flight
    #[error("execution {0} already has a pending async result")]
    AsyncAlreadyPending(ExecutionId),

    /// No async execution with this id is in flight
    #[error("execution {0} has no pending async result")]
    AsyncNotPending(ExecutionId),

    // ========================================================================
    // Size
    // ========================================================================
    /// Buffer size differs from what the slot or region needs
    #[error("{target}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// What was being sized ("slot", "region 3", ...)
        target: String,
        /// Required size
        expected: usize,
        /// Supplied size
        actual: usize,
    },

    // ========================================================================
    // Memory
    // ========================================================================
    /// Backend could not provide the requested memory
    #[error("allocation of {size} bytes failed: {reason}")]
    AllocationFailed {
        /// Requested size
        size: usize,
        /// Backend message
        reason: String,
    },

    /// Buffer is not in the registry pool
    #[error("buffer at {0:#x} is not registered")]
    BufferNotRegistered(u64),

    /// Integrity tag no longer matches; the buffer was still released
    #[error("buffer at {address:#x} failed its integrity check")]
    TagMismatch {
        /// Buffer address
        address: u64,
    },

    /// Registry has no backend (not initialized or already shut down)
    #[error("memory registry has no allocator backend")]
    AllocatorUnavailable,

    /// Native descriptor is not known to the backend
    #[error("unknown native descriptor {0}")]
    UnknownDescriptor(i32),

    /// Backend does not support importing native memory
    #[error("allocator backend does not support import")]
    ImportUnsupported,

    /// Access beyond the end of a buffer
    #[error("access of {len} bytes at {at} exceeds buffer size {size}")]
    OutOfBounds {
        /// Start offset
        at: usize,
        /// Length
        len: usize,
        /// Buffer size
        size: usize,
    },

    // ========================================================================
    // I/O and collaborators
    // ========================================================================
    /// File or device I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Dispatch layer rejected the request
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Request filtered by the dispatch layer (unsupported on this device)
    #[error("filtered: {0}")]
    Filtered(String),

    /// Invariant violation inside the runtime
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad ids, missing setup, rejected arguments or config
    Configuration,
    /// Operation issued in the wrong lifecycle state
    ProtocolViolation,
    /// Buffer size disagrees with slot or region
    SizeMismatch,
    /// Allocation, import, release or integrity failure
    Memory,
    /// File or device I/O
    Io,
    /// Collaborator failure or runtime bug
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ContextNotInitialized
            | Error::InvalidModelId(_)
            | Error::ModelNotFound(_)
            | Error::ExecutionsNotGenerated { .. }
            | Error::SessionOutOfRange { .. }
            | Error::InvalidExecutionCount
            | Error::RegionOutOfRange(_)
            | Error::InvalidArgument(_)
            | Error::Config(_) => ErrorKind::Configuration,

            Error::AlreadyCommitted { .. }
            | Error::CommitInProgress { .. }
            | Error::SlotNotFound(_)
            | Error::PartialBinding(..)
            | Error::DirectionNotBindable(_)
            | Error::ExecutionIdAssigned { .. }
            | Error::UnboundRegions { .. }
            | Error::NotCommitted { .. }
            | Error::AsyncAlreadyPending(_)
            | Error::AsyncNotPending(_) => ErrorKind::ProtocolViolation,

            Error::SizeMismatch { .. } => ErrorKind::SizeMismatch,

            Error::AllocationFailed { .. }
            | Error::BufferNotRegistered(_)
            | Error::TagMismatch { .. }
            | Error::AllocatorUnavailable
            | Error::UnknownDescriptor(_)
            | Error::ImportUnsupported
            | Error::OutOfBounds { .. } => ErrorKind::Memory,

            Error::Io(_) => ErrorKind::Io,

            Error::Dispatch(_) | Error::Filtered(_) | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Client result code for this error.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Error::Filtered(_) => ReturnCode::Filtered,
            _ => match self.kind() {
                ErrorKind::Configuration => ReturnCode::InvalidArgument,
                ErrorKind::ProtocolViolation | ErrorKind::Internal => ReturnCode::GenericFailure,
                ErrorKind::SizeMismatch => ReturnCode::SizeError,
                ErrorKind::Memory => ReturnCode::MemoryError,
                ErrorKind::Io => ReturnCode::IoError,
            },
        }
    }

    /// Check if this is a lifecycle-order error.
    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == ErrorKind::ProtocolViolation
    }

    /// Check if this is a size mismatch.
    pub fn is_size_mismatch(&self) -> bool {
        self.kind() == ErrorKind::SizeMismatch
    }

    /// Check if this is a memory error.
    pub fn is_memory_error(&self) -> bool {
        self.kind() == ErrorKind::Memory
    }

    /// Check if this is a not-found error (model, slot or buffer).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ModelNotFound(_) | Error::SlotNotFound(_) | Error::BufferNotRegistered(_)
        )
    }
}

/// Result codes returned by the client layer.
///
/// Discriminants are stable and match the order callers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReturnCode {
    /// Operation succeeded
    Success = 0,
    /// Unclassified failure
    GenericFailure = 1,
    /// I/O failure
    IoError = 2,
    /// Invalid argument or configuration
    InvalidArgument = 3,
    /// Filtered by the dispatch layer
    Filtered = 4,
    /// Memory failure
    MemoryError = 5,
    /// Size mismatch
    SizeError = 6,
}

impl ReturnCode {
    /// Code for any result.
    ///
    /// # Examples
    ///
    /// ```
    /// use nerve_core::{Error, ReturnCode};
    ///
    /// let ok: nerve_core::Result<()> = Ok(());
    /// assert_eq!(ReturnCode::of(&ok), ReturnCode::Success);
    ///
    /// let err: nerve_core::Result<()> = Err(Error::InvalidExecutionCount);
    /// assert_eq!(ReturnCode::of(&err), ReturnCode::InvalidArgument);
    /// ```
    pub fn of<T>(result: &Result<T>) -> ReturnCode {
        match result {
            Ok(_) => ReturnCode::Success,
            Err(err) => err.return_code(),
        }
    }

    /// Numeric value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check for success.
    pub fn is_success(self) -> bool {
        self == ReturnCode::Success
    }
}

impl From<&Error> for ReturnCode {
    fn from(err: &Error) -> Self {
        err.return_code()
    }
}
