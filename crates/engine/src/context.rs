//! Process context
//!
//! A [`ProcessContext`] owns one of each runtime component and the dispatch
//! collaborator. It is reference counted by [`acquire`] and [`release`]:
//! the first acquire builds the components, the last release tears them down.
//!
//! ## Build order
//!
//! ```text
//! acquire (count 0 → 1)                 release (count 1 → 0)
//! 1. BufferRegistry                     1. drain every async execution
//! 2. Dispatcher::init                   2. Dispatcher::deinit
//! 3. SessionStore                       3. BufferRegistry::shutdown
//! 4. AsyncExecutionRegistry
//! ```
//!
//! A failure at any acquire step undoes the earlier steps and leaves the count
//! untouched. The session store is not force-cleared on release; models still
//! open at that point are only reported.
//!
//! # Thread Safety
//!
//! The context lock is disjoint from the component locks. Operations clone
//! the component handle out of the lock and run without it, so teardown only
//! waits for operations already holding a handle.
//!
//! [`acquire`]: ProcessContext::acquire
//! [`release`]: ProcessContext::release

use crate::config::ContextOptions;
use crate::dispatch::Dispatcher;
use nerve_concurrency::AsyncExecutionRegistry;
use nerve_core::{Error, ModelId, Result};
use nerve_memory::BufferRegistry;
use nerve_session::SessionStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Runtime version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Components that live between first acquire and last release.
pub(crate) struct Components {
    pub(crate) registry: BufferRegistry,
    pub(crate) store: SessionStore,
    pub(crate) async_registry: AsyncExecutionRegistry,
}

struct ContextState {
    ref_count: usize,
    components: Option<Arc<Components>>,
}

/// Ref-counted coordinator of the runtime components.
pub struct ProcessContext {
    options: ContextOptions,
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    state: Mutex<ContextState>,
    /// Serializes commits so check, allocate, verify and assign run as one step.
    pub(crate) commit_lock: Mutex<()>,
}

impl ProcessContext {
    /// Create an uninitialized context. Call [`acquire`](Self::acquire) before use.
    pub fn new(options: ContextOptions, dispatcher: Arc<dyn Dispatcher>) -> Self {
        ProcessContext {
            options,
            dispatcher,
            state: Mutex::new(ContextState {
                ref_count: 0,
                components: None,
            }),
            commit_lock: Mutex::new(()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Take a reference, building the components on the first one.
    ///
    /// Returns the new reference count.
    pub fn acquire(&self) -> Result<usize> {
        let mut state = self.state.lock();
        if state.ref_count == 0 {
            state.components = Some(Arc::new(self.build_components()?));
            tracing::info!(
                version = VERSION,
                dispatcher = self.dispatcher.name(),
                allocator = %self.options.allocator,
                "runtime context initialized"
            );
        }
        state.ref_count += 1;
        tracing::debug!(ref_count = state.ref_count, "context acquired");
        Ok(state.ref_count)
    }

    fn build_components(&self) -> Result<Components> {
        self.options.validate()?;

        let registry = BufferRegistry::new(self.options.allocator, self.options.memory_limit)
            .with_retry_limit(self.options.deinit_retry_limit);

        if let Err(e) = self.dispatcher.init() {
            tracing::error!(error = %e, "dispatcher init failed");
            registry.shutdown();
            return Err(e);
        }

        let store = SessionStore::new();

        let async_registry = match AsyncExecutionRegistry::new(self.options.async_workers) {
            Ok(async_registry) => async_registry,
            Err(e) => {
                tracing::error!(error = %e, "async registry init failed");
                if let Err(deinit_err) = self.dispatcher.deinit() {
                    tracing::error!(
                        error = %deinit_err,
                        "dispatcher deinit failed during rollback"
                    );
                }
                registry.shutdown();
                return Err(e);
            }
        };

        Ok(Components {
            registry,
            store,
            async_registry,
        })
    }

    /// Drop a reference, tearing down on the last one (or immediately if `force`).
    ///
    /// Returns the remaining reference count.
    pub fn release(&self, force: bool) -> Result<usize> {
        let mut state = self.state.lock();
        if state.ref_count == 0 {
            return Err(Error::ContextNotInitialized);
        }

        state.ref_count = if force { 0 } else { state.ref_count - 1 };
        if state.ref_count > 0 {
            tracing::debug!(ref_count = state.ref_count, "context released");
            return Ok(state.ref_count);
        }

        let Some(components) = state.components.take() else {
            return Ok(0);
        };

        let drained = components.async_registry.drain_all();
        if drained > 0 {
            tracing::warn!(count = drained, "flushed async executions at teardown");
        }

        if let Err(e) = self.dispatcher.deinit() {
            tracing::error!(error = %e, "dispatcher deinit failed");
        }

        let open = components.store.model_ids();
        if !open.is_empty() {
            tracing::warn!(models = ?open, "models still open at teardown");
        }

        components.registry.shutdown();
        tracing::info!(forced = force, "runtime context torn down");
        Ok(0)
    }

    pub(crate) fn components(&self) -> Result<Arc<Components>> {
        self.state
            .lock()
            .components
            .clone()
            .ok_or(Error::ContextNotInitialized)
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current reference count.
    pub fn ref_count(&self) -> usize {
        self.state.lock().ref_count
    }

    /// Whether the components are live.
    pub fn is_initialized(&self) -> bool {
        self.state.lock().components.is_some()
    }

    /// Options the context was created with.
    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// The dispatch collaborator.
    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Runtime version.
    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// Number of live buffers in the registry.
    pub fn pool_len(&self) -> Result<usize> {
        Ok(self.components()?.registry.pool_len())
    }

    /// Ids of every open model.
    pub fn open_models(&self) -> Result<Vec<ModelId>> {
        Ok(self.components()?.store.model_ids())
    }

    /// Number of async executions not yet waited for.
    pub fn pending_async(&self) -> Result<usize> {
        Ok(self.components()?.async_registry.len())
    }

    /// Log every live buffer at debug level.
    pub fn log_pool(&self) -> Result<()> {
        self.components()?.registry.log_pool();
        Ok(())
    }
}

impl std::fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessContext")
            .field("ref_count", &self.ref_count())
            .field("dispatcher", &self.dispatcher.name())
            .field("options", &self.options)
            .finish()
    }
}
