//! Stable exit codes for the `wtf` CLI.

/// Run completed with every variant built, or the user declined an overwrite.
pub const OK: i32 = 0;
/// Bad arguments, descriptor, configuration, or any other runtime error.
pub const USAGE: i32 = 1;
/// Source reference is malformed (whitespace, unrecognized shape).
pub const BAD_REFERENCE: i32 = 2;
/// At least one package ended with an errored or blocked variant.
pub const RUN_FAILED: i32 = 3;
/// Source reference links to a branch page instead of the repository root.
pub const BRANCH_SUBPAGE: i32 = 4;
/// No source packages were available to test.
pub const NO_SOURCE: i32 = 5;
