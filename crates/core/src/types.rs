//! Identifier types
//!
//! Model ids and execution ids are both 64-bit values minted by the dispatch
//! layer. An execution id carries its owning model in the bits selected by
//! [`MODEL_ID_MASK`], which lets the runtime find every in-flight execution of
//! a model without a reverse index.

use serde::{Deserialize, Serialize};

/// Bits of an [`ExecutionId`] that identify the owning model.
///
/// The low 24 bits are left to the dispatch layer for its own per-model
/// sequence numbering.
pub const MODEL_ID_MASK: u64 = 0xFFFF_FFFF_FF00_0000;

/// Index of a session (one execution slot of a model's execution set).
pub type SessionId = usize;

/// Identifier of an opened model.
///
/// Zero is never a valid model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId(u64);

impl ModelId {
    /// Wrap a raw id.
    ///
    /// # Examples
    ///
    /// ```
    /// use nerve_core::ModelId;
    ///
    /// let id = ModelId::new(0x0100_0000);
    /// assert!(id.is_valid());
    /// assert!(!ModelId::new(0).is_valid());
    /// ```
    pub const fn new(raw: u64) -> Self {
        ModelId(raw)
    }

    /// Raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this id can name an opened model.
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for ModelId {
    fn from(raw: u64) -> Self {
        ModelId(raw)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Identifier of a committed execution.
///
/// Zero means "unassigned"; an execution only carries a nonzero id once it
/// has been committed to the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(u64);

impl ExecutionId {
    /// The unassigned id.
    pub const UNASSIGNED: ExecutionId = ExecutionId(0);

    /// Wrap a raw id.
    pub const fn new(raw: u64) -> Self {
        ExecutionId(raw)
    }

    /// Raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether the dispatch layer has assigned this id.
    pub const fn is_assigned(&self) -> bool {
        self.0 != 0
    }

    /// The model this execution belongs to.
    ///
    /// # Examples
    ///
    /// ```
    /// use nerve_core::{ExecutionId, ModelId};
    ///
    /// let exec = ExecutionId::new(0x0300_0007);
    /// assert_eq!(exec.model_component(), ModelId::new(0x0300_0000));
    /// ```
    pub const fn model_component(&self) -> ModelId {
        ModelId(self.0 & MODEL_ID_MASK)
    }
}

impl From<u64> for ExecutionId {
    fn from(raw: u64) -> Self {
        ExecutionId(raw)
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
