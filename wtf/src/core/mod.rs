//! Deterministic, pure logic for the build scheduler.
//!
//! Core modules are free of I/O. They operate on in-memory data and return
//! deterministic results, so every rule here is testable in isolation.

pub mod dependency;
pub mod graph;
pub mod report;
pub mod types;
pub mod variant;
