//! Deterministic collaborators and fixtures for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::report::PackageSummary;
use crate::core::types::{BuildOutcome, TestOutcome};
use crate::core::variant::VariantDecl;
use crate::descriptor::TestDescriptor;
use crate::fetch::Package;
use crate::io::actions::{ActionRequest, BuildAction, CheckAction, TestAction};
use crate::io::git::SourceFetcher;
use crate::io::workspace::{Confirm, Workspace};
use crate::source::{CodeSource, Origin};

/// Descriptor with `compiler` and the given variants, no options or parameters.
pub fn descriptor(compiler: &str, variants: &[&str]) -> TestDescriptor {
    TestDescriptor {
        compiler: compiler.to_string(),
        variants: variants.iter().map(|name| VariantDecl::new(name)).collect(),
        configure_options: Vec::new(),
        parameters: BTreeMap::new(),
    }
}

/// Write a `<name>.wtf` descriptor file into `dir`.
pub fn write_descriptor(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(format!("{name}.wtf"));
    fs::write(&path, contents).expect("write descriptor");
    path
}

/// Empty working area in a fresh temporary directory.
pub fn temp_workspace() -> (tempfile::TempDir, Workspace) {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = Workspace::new(temp.path().join("tarballs"));
    (temp, workspace)
}

/// Package pointing at an archive that need not exist.
pub fn package(name: &str) -> Package {
    let archive = PathBuf::from(format!("tarballs/{name}.tar"));
    Package {
        source: CodeSource {
            origin: Origin::Local {
                path: archive.clone(),
            },
            package_name: name.to_string(),
        },
        archive,
    }
}

/// Fetcher that records calls and fakes a checkout.
#[derive(Debug, Default)]
pub struct RecordingFetcher {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingFetcher {
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("fetcher lock").clone()
    }
}

impl SourceFetcher for RecordingFetcher {
    fn fetch(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        self.calls
            .lock()
            .expect("fetcher lock")
            .push((url.to_string(), branch.to_string()));
        fs::create_dir_all(dest)?;
        fs::write(dest.join("README"), format!("{url} @ {branch}\n"))?;
        Ok(())
    }
}

/// Confirmation with a fixed answer; remembers the questions asked.
#[derive(Debug)]
pub struct FixedAnswer {
    answer: bool,
    questions: Mutex<Vec<String>>,
}

impl FixedAnswer {
    pub fn yes() -> Self {
        Self {
            answer: true,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn no() -> Self {
        Self {
            answer: false,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().expect("confirm lock").clone()
    }
}

impl Confirm for FixedAnswer {
    fn confirm(&self, question: &str) -> Result<bool> {
        self.questions
            .lock()
            .expect("confirm lock")
            .push(question.to_string());
        Ok(self.answer)
    }
}

/// Something a scripted collaborator was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionEvent {
    BuildStarted { package: String, variant: String },
    BuildFinished { package: String, variant: String },
    Test { package: String, variant: String },
    Check { package: String },
}

/// Build/test/check collaborators with predetermined outcomes.
///
/// Every variant builds and tests successfully unless listed otherwise.
#[derive(Debug, Default)]
pub struct ScriptedActions {
    build_failures: BTreeSet<String>,
    build_errors: BTreeSet<String>,
    test_failures: BTreeSet<String>,
    events: Mutex<Vec<ActionEvent>>,
    requests: Mutex<Vec<ActionRequest>>,
}

impl ScriptedActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The build reports failure.
    pub fn fail_build(mut self, variant: &str) -> Self {
        self.build_failures.insert(variant.to_string());
        self
    }

    /// The build cannot even be dispatched.
    pub fn break_build(mut self, variant: &str) -> Self {
        self.build_errors.insert(variant.to_string());
        self
    }

    pub fn fail_test(mut self, variant: &str) -> Self {
        self.test_failures.insert(variant.to_string());
        self
    }

    pub fn events(&self) -> Vec<ActionEvent> {
        self.events.lock().expect("events lock").clone()
    }

    /// Build requests in dispatch order.
    pub fn build_requests(&self) -> Vec<ActionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Variants whose build was started, in dispatch order.
    pub fn built(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ActionEvent::BuildStarted { variant, .. } => Some(variant),
                _ => None,
            })
            .collect()
    }

    pub fn tested(&self) -> BTreeSet<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ActionEvent::Test { variant, .. } => Some(variant),
                _ => None,
            })
            .collect()
    }

    /// Position of the first matching event.
    pub fn position(&self, wanted: &ActionEvent) -> Option<usize> {
        self.events().iter().position(|event| event == wanted)
    }

    fn record(&self, event: ActionEvent) {
        self.events.lock().expect("events lock").push(event);
    }
}

impl BuildAction for ScriptedActions {
    fn build(&self, request: &ActionRequest) -> Result<BuildOutcome> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.record(ActionEvent::BuildStarted {
            package: request.package.clone(),
            variant: request.variant.clone(),
        });
        if self.build_errors.contains(&request.variant) {
            return Err(anyhow!("cannot submit build for {}", request.variant));
        }
        let outcome = if self.build_failures.contains(&request.variant) {
            BuildOutcome::Failure
        } else {
            BuildOutcome::Success
        };
        self.record(ActionEvent::BuildFinished {
            package: request.package.clone(),
            variant: request.variant.clone(),
        });
        Ok(outcome)
    }
}

impl TestAction for ScriptedActions {
    fn test(&self, request: &ActionRequest) -> Result<TestOutcome> {
        self.record(ActionEvent::Test {
            package: request.package.clone(),
            variant: request.variant.clone(),
        });
        if self.test_failures.contains(&request.variant) {
            Ok(TestOutcome::fail())
        } else {
            Ok(TestOutcome::pass())
        }
    }
}

impl CheckAction for ScriptedActions {
    fn check(&self, summary: &PackageSummary) -> Result<String> {
        self.record(ActionEvent::Check {
            package: summary.package.clone(),
        });
        Ok(summary.render_text())
    }
}
