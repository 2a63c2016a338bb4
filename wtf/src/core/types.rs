//! Shared deterministic types for the build scheduler core.
//!
//! These types define stable contracts between the state machine, the
//! scheduler and the report. They do not depend on I/O.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Lifecycle of one build variant within one package cycle.
///
/// `Done` and `Error` are terminal. A variant still `Waiting` once the
/// scheduler stops making progress is reported as blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    /// No unmet dependency; ready for dispatch.
    Pending,
    /// Prerequisite has not reached `Done`.
    Waiting,
    /// Build dispatched, outcome not yet reported.
    Building,
    /// Build succeeded.
    Done,
    /// Build failed.
    Error,
}

impl VariantStatus {
    /// Initial status given the current status of the prerequisite (if any).
    pub fn initial(prerequisite: Option<VariantStatus>) -> Self {
        match prerequisite {
            None | Some(VariantStatus::Done) => VariantStatus::Pending,
            Some(_) => VariantStatus::Waiting,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VariantStatus::Done | VariantStatus::Error)
    }
}

impl fmt::Display for VariantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VariantStatus::Pending => "pending",
            VariantStatus::Waiting => "waiting",
            VariantStatus::Building => "building",
            VariantStatus::Done => "done",
            VariantStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Outcome reported by the build collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Success,
    Failure,
}

/// Outcome reported by the test-run collaborator for one `done` variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub passed: bool,
    /// Files the test run left behind (output, logs, comparison data).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}

impl TestOutcome {
    pub fn pass() -> Self {
        Self {
            passed: true,
            artifacts: Vec::new(),
        }
    }

    pub fn fail() -> Self {
        Self {
            passed: false,
            artifacts: Vec::new(),
        }
    }
}
