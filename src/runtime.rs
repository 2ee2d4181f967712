//! Main runtime entry point for nerve.
//!
//! This module provides the [`Runtime`] handle, the primary entry point for
//! all client operations. Each handle holds one reference on a shared
//! [`ProcessContext`]; the context is torn down when the last handle closes.

use crate::error::Result;
use nerve_engine::{ContextOptions, Dispatcher, LoopbackDispatcher, ProcessContext};
use nerve_memory::AllocatorKind;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A reference on the nerve runtime.
///
/// Dereferences to [`ProcessContext`], so every client operation is
/// available directly on the handle.
///
/// # Example
///
/// ```ignore
/// use nerve::prelude::*;
///
/// let runtime = Runtime::builder()
///     .dispatcher(Arc::new(LoopbackDispatcher::new()))
///     .open()?;
///
/// let model = runtime.open_model(Path::new("model.nnc"))?;
/// let buffers = runtime.allocate_all_buffers(model, 0, true)?;
/// buffers.inputs[0].write(0, &input_bytes)?;
/// runtime.execute(model, 0)?;
///
/// runtime.close_model(model)?;
/// runtime.release_buffers(&buffers.all())?;
/// runtime.close()?;
/// ```
pub struct Runtime {
    inner: Arc<ProcessContext>,
    closed: AtomicBool,
}

impl Runtime {
    /// Open a runtime with default options and the loopback dispatcher.
    pub fn open() -> Result<Self> {
        Self::builder().open()
    }

    /// Create a builder for runtime configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Take another reference on the same context.
    pub fn handle(&self) -> Result<Self> {
        self.inner.acquire()?;
        Ok(Runtime {
            inner: Arc::clone(&self.inner),
            closed: AtomicBool::new(false),
        })
    }

    /// Drop this handle's reference.
    ///
    /// The last close tears the context down. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.release(false).map(|_| ())
    }

    /// Tear the context down regardless of other handles.
    pub fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.inner.release(true).map(|_| ())
    }

    /// The shared context.
    pub fn context(&self) -> &Arc<ProcessContext> {
        &self.inner
    }
}

impl Deref for Runtime {
    type Target = ProcessContext;

    fn deref(&self) -> &ProcessContext {
        &self.inner
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = self.close() {
                tracing::debug!(error = %e, "runtime handle dropped after context teardown");
            }
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("context", &self.inner)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Builder for runtime configuration.
///
/// # Example
///
/// ```ignore
/// let runtime = Runtime::builder()
///     .allocator(AllocatorKind::Device)
///     .async_workers(2)
///     .open()?;
/// ```
pub struct RuntimeBuilder {
    options: ContextOptions,
    dispatcher: Option<Arc<dyn Dispatcher>>,
}

impl RuntimeBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        RuntimeBuilder {
            options: ContextOptions::default(),
            dispatcher: None,
        }
    }

    /// Replace all options.
    pub fn options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    /// Load options from a TOML file.
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.options = ContextOptions::from_file(path)?;
        Ok(self)
    }

    /// Select the memory backend.
    pub fn allocator(mut self, kind: AllocatorKind) -> Self {
        self.options = self.options.allocator(kind);
        self
    }

    /// Cap backend memory.
    pub fn memory_limit(mut self, limit: usize) -> Self {
        self.options = self.options.memory_limit(Some(limit));
        self
    }

    /// Set the async pool size.
    pub fn async_workers(mut self, workers: usize) -> Self {
        self.options = self.options.async_workers(workers);
        self
    }

    /// Use a specific dispatch collaborator. Defaults to [`LoopbackDispatcher`].
    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Build the context and take the first reference.
    pub fn open(self) -> Result<Runtime> {
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(LoopbackDispatcher::new()));
        let inner = Arc::new(ProcessContext::new(self.options, dispatcher));
        inner.acquire()?;
        Ok(Runtime {
            inner,
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("options", &self.options)
            .field("dispatcher", &self.dispatcher.as_ref().map(|d| d.name()))
            .finish()
    }
}
