//! Deferred execution results

use nerve_core::{Error, Result};
use std::sync::mpsc::Receiver;

/// Result of an asynchronous execution, available later.
#[derive(Debug)]
pub enum PendingExecution {
    /// Result already known
    Ready(Result<()>),
    /// Result will arrive from a worker
    Channel(Receiver<Result<()>>),
}

impl PendingExecution {
    /// A result that is already known.
    pub fn ready(result: Result<()>) -> Self {
        PendingExecution::Ready(result)
    }

    /// Block until the result is available.
    pub fn wait(self) -> Result<()> {
        match self {
            PendingExecution::Ready(result) => result,
            PendingExecution::Channel(rx) => rx.recv().map_err(|_| {
                Error::Internal("async execution worker exited without a result".to_string())
            })?,
        }
    }

    /// Whether waiting would not block.
    pub fn is_ready(&self) -> bool {
        matches!(self, PendingExecution::Ready(_))
    }
}
