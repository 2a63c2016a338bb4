//! Side-effecting collaborators: configuration, child processes, version
//! control, archives, build/test/check actions and the working area.

pub mod actions;
pub mod archive;
pub mod config;
pub mod git;
pub mod process;
pub mod workspace;
