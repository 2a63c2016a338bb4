//! Typed failures that decide how a run ends.
//!
//! Everything else travels as `anyhow::Error`; the binary downcasts to
//! [`WtfError`] to pick an exit code.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::graph::GraphError;
use crate::exit_codes;

/// Why a source reference was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceProblem {
    /// The reference contains whitespace.
    Whitespace,
    /// Not a recognizable repository URL, branch or path.
    Shape,
    /// Links to a branch or file page (`/tree/...`, `/blob/...`) instead of
    /// the repository root.
    BranchSubpage,
}

impl fmt::Display for ReferenceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceProblem::Whitespace => f.write_str("contains whitespace"),
            ReferenceProblem::Shape => f.write_str("malformed repository URL, branch or path"),
            ReferenceProblem::BranchSubpage => {
                f.write_str("points at a branch page, not the repository root")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum WtfError {
    #[error("invalid source reference '{reference}': {problem}")]
    InvalidReference {
        reference: String,
        problem: ReferenceProblem,
    },
    #[error("no source packages to test")]
    NoSource,
    #[error("not overwriting existing package '{package}'")]
    OverwriteDeclined { package: String },
    #[error("package '{package}' is being prepared by another run ({})", .lock.display())]
    PackageBusy { package: String, lock: PathBuf },
    #[error("test descriptor {}: {reason}", .path.display())]
    Descriptor { path: PathBuf, reason: String },
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl WtfError {
    pub fn invalid_reference(reference: &str, problem: ReferenceProblem) -> Self {
        WtfError::InvalidReference {
            reference: reference.to_string(),
            problem,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            WtfError::InvalidReference {
                problem: ReferenceProblem::BranchSubpage,
                ..
            } => exit_codes::BRANCH_SUBPAGE,
            WtfError::InvalidReference { .. } => exit_codes::BAD_REFERENCE,
            WtfError::NoSource => exit_codes::NO_SOURCE,
            WtfError::OverwriteDeclined { .. } => exit_codes::OK,
            WtfError::PackageBusy { .. }
            | WtfError::Descriptor { .. }
            | WtfError::Usage(_)
            | WtfError::Graph(_) => exit_codes::USAGE,
        }
    }
}

/// Exit code for an error chain: the first [`WtfError`] found decides,
/// anything else is a usage/runtime failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<WtfError>())
        .map_or(exit_codes::USAGE, WtfError::exit_code)
}
