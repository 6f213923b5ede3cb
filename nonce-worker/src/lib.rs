//! Nonce-range work executor.
//!
//! A worker takes a task definition and nonce ranges from a coordinator,
//! scores every nonce with a pluggable backend, and reports results that meet
//! the task's share or main thresholds.

pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod executor;
pub mod scoring;
pub mod tracing;
pub mod types;
pub mod u256;
