//! Runtime configuration
//!
//! [`ContextOptions`] controls how a [`ProcessContext`](crate::ProcessContext)
//! builds its components. Options can be set with the builder methods or read
//! from TOML:
//!
//! ```toml
//! allocator = "device"
//! memory_limit = 67108864
//! async_workers = 2
//! deinit_retry_limit = 100
//! ```
//!
//! Every key is optional; missing keys take their defaults.

use nerve_concurrency::DEFAULT_ASYNC_WORKERS;
use nerve_core::{Error, Result};
use nerve_memory::{AllocatorKind, DEFAULT_SHUTDOWN_RETRY_LIMIT};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for building a process context.
///
/// ```ignore
/// use nerve_engine::ContextOptions;
/// use nerve_memory::AllocatorKind;
///
/// let opts = ContextOptions::new()
///     .allocator(AllocatorKind::Device)
///     .async_workers(2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextOptions {
    /// Memory backend
    pub allocator: AllocatorKind,
    /// Byte budget for the backend; unlimited when `None`
    pub memory_limit: Option<usize>,
    /// Threads in the async execution pool
    pub async_workers: usize,
    /// Buffers force-released at teardown before giving up
    pub deinit_retry_limit: usize,
}

impl ContextOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the memory backend.
    pub fn allocator(mut self, kind: AllocatorKind) -> Self {
        self.allocator = kind;
        self
    }

    /// Cap the bytes the backend may hand out.
    pub fn memory_limit(mut self, limit: Option<usize>) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Set the async pool size.
    pub fn async_workers(mut self, workers: usize) -> Self {
        self.async_workers = workers;
        self
    }

    /// Set the teardown release bound.
    pub fn deinit_retry_limit(mut self, limit: usize) -> Self {
        self.deinit_retry_limit = limit;
        self
    }

    /// Reject values no context can be built with.
    pub fn validate(&self) -> Result<()> {
        if self.async_workers == 0 {
            return Err(Error::Config("async_workers must be positive".to_string()));
        }
        if self.memory_limit == Some(0) {
            return Err(Error::Config("memory_limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Parse and validate options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: ContextOptions =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Read, parse and validate options from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            allocator: AllocatorKind::platform_default(),
            memory_limit: None,
            async_workers: DEFAULT_ASYNC_WORKERS,
            deinit_retry_limit: DEFAULT_SHUTDOWN_RETRY_LIMIT,
        }
    }
}
