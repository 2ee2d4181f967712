//! Dispatch layer seam
//!
//! Everything below the runtime core (model parsing, accelerator scheduling,
//! the transport to the device service) is reached through [`Dispatcher`].
//! The runtime calls it with no registry or store lock held.

pub mod loopback;

use nerve_core::{ExecutionId, ModelId, Result, Session};
use nerve_memory::Buffer;
use nerve_session::Execution;

/// Hardware dispatch collaborator.
///
/// # Thread Safety
///
/// `execute` is called concurrently from caller threads and async workers.
pub trait Dispatcher: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Bring the dispatch layer up.
    fn init(&self) -> Result<()>;

    /// Tear the dispatch layer down.
    fn deinit(&self) -> Result<()>;

    /// Parse the model image held in `model` and return its layout.
    ///
    /// The returned session's model id must be nonzero with its low 24 bits
    /// clear.
    fn open_model(&self, model: &Buffer) -> Result<Session>;

    /// Forget a model.
    fn close_model(&self, model_id: ModelId) -> Result<()>;

    /// Accept a fully bound execution and return its id.
    fn commit_execution(&self, model_id: ModelId, execution: &Execution) -> Result<ExecutionId>;

    /// Run a committed execution to completion.
    fn execute(&self, execution_id: ExecutionId) -> Result<()>;
}
