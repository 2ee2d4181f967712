//! Engine Integration Tests
//!
//! End-to-end tests for nerve-engine: model lifecycle, binding rules,
//! commit rollback, async execution and context teardown.

#[path = "../common/mod.rs"]
mod common;

mod binding;
mod commit;
mod concurrency;
mod lifecycle;
