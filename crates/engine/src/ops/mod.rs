//! Client operations
//!
//! Every operation is an inherent method on [`ProcessContext`](crate::ProcessContext),
//! grouped by concern:
//! - `model`: open, close, execution space, layout queries
//! - `binding`: bind by index, by label, all at once
//! - `execute`: commit, synchronous and asynchronous execute, wait
//! - `buffers`: allocate, import, view, release

mod binding;
mod buffers;
mod execute;
mod guard;
mod model;

pub use buffers::AllocatedBuffers;
pub use model::ModelSource;
