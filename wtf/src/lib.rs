//! Regression test driver for WRF source trees.
//!
//! A run acquires one or more source packages, reads a per-machine test
//! descriptor, and builds, tests and checks every declared build variant of
//! every package while honoring the dependencies between variants. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (dependency resolution, graph
//!   validation, the variant state machine, reports). No I/O.
//! - **[`io`]**: Side-effecting collaborators (configuration, child processes,
//!   git, archives, build/test/check scripts, the working area). Each sits
//!   behind a trait so tests can substitute scripted versions.
//!
//! Orchestration modules ([`fetch`], [`schedule`]) coordinate the two.

pub mod core;
pub mod descriptor;
pub mod error;
pub mod exit_codes;
pub mod fetch;
pub mod io;
pub mod logging;
pub mod schedule;
pub mod source;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
