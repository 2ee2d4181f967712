//! Unified error types for nerve.
//!
//! Every crate in the workspace shares one error enum, defined in
//! `nerve-core` and re-exported here. Use [`Error::kind`] to branch on the
//! error family and [`ReturnCode::of`] to collapse any result into the
//! closed result-code set exposed to clients.
//!
//! ```ignore
//! use nerve::prelude::*;
//!
//! let result = runtime.commit(model, 0);
//! match ReturnCode::of(&result) {
//!     ReturnCode::Success => {}
//!     ReturnCode::SizeError => eprintln!("a bound buffer has the wrong size"),
//!     code => eprintln!("commit failed: {:?}", code),
//! }
//! ```

pub use nerve_core::error::{Error, ErrorKind, Result, ReturnCode};
