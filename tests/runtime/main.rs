//! Runtime facade integration tests
//!
//! Exercises the public `nerve` surface end to end: builder, handles,
//! configuration files and the full open/bind/execute/close cycle.

#[path = "../common/mod.rs"]
mod common;

mod config;
mod workflow;
