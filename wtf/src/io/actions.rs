//! Build, test and check collaborators.
//!
//! The traits decouple the scheduler from how work is actually carried out.
//! [`ScriptActions`] runs configured scripts (optionally through a batch
//! submission prefix); tests use scripted implementations that return
//! predetermined outcomes without spawning anything.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::report::PackageSummary;
use crate::core::types::{BuildOutcome, TestOutcome};
use crate::io::config::WtfConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout, write_log};

/// Prefix of stdout lines in which a test script names an artifact.
pub const ARTIFACT_PREFIX: &str = "artifact:";

/// Everything a collaborator needs to build or test one variant of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub compiler: String,
    pub package: String,
    /// Package archive (or source directory) handed to the scripts.
    pub package_path: PathBuf,
    pub variant: String,
    pub variant_options: Vec<String>,
    pub global_options: Vec<String>,
    /// Auxiliary descriptor parameters.
    pub parameters: BTreeMap<String, String>,
}

impl ActionRequest {
    /// Global tokens followed by the variant's own.
    pub fn configure_options(&self) -> Vec<String> {
        self.global_options
            .iter()
            .chain(&self.variant_options)
            .cloned()
            .collect()
    }
}

/// Configures and compiles one variant. Sole authority for `building -> done | error`.
pub trait BuildAction: Sync {
    fn build(&self, request: &ActionRequest) -> Result<BuildOutcome>;
}

/// Runs the regression test of one `done` variant.
pub trait TestAction: Sync {
    fn test(&self, request: &ActionRequest) -> Result<TestOutcome>;
}

/// Produces the human-readable summary for one package.
pub trait CheckAction {
    fn check(&self, summary: &PackageSummary) -> Result<String>;
}

/// Collaborators backed by external scripts.
#[derive(Debug, Clone)]
pub struct ScriptActions {
    build: Vec<String>,
    test: Vec<String>,
    check: Vec<String>,
    submit: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
    output_limit_bytes: usize,
    log_dir: PathBuf,
}

impl ScriptActions {
    /// Scripts from `cfg`, logging under `log_dir/<package>/`.
    pub fn from_config(cfg: &WtfConfig, log_dir: &Path) -> Self {
        Self {
            build: cfg.actions.build.clone(),
            test: cfg.actions.test.clone(),
            check: cfg.actions.check.clone(),
            submit: cfg.actions.submit.clone(),
            env: cfg.env.clone(),
            timeout: cfg.action_timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            log_dir: log_dir.to_path_buf(),
        }
    }

    pub fn log_path(&self, package: &str, name: &str) -> PathBuf {
        self.log_dir.join(package).join(format!("{name}.log"))
    }

    fn command(&self, argv: &[String]) -> Result<Command> {
        let mut full = self.submit.iter().chain(argv);
        let program = full
            .next()
            .ok_or_else(|| anyhow!("collaborator command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(full).envs(&self.env);
        Ok(cmd)
    }

    fn variant_command(&self, argv: &[String], request: &ActionRequest) -> Result<Command> {
        let mut cmd = self.command(argv)?;
        cmd.env("WTF_COMPILER", &request.compiler)
            .env("WTF_PACKAGE", &request.package)
            .env("WTF_PACKAGE_PATH", &request.package_path)
            .env("WTF_VARIANT", &request.variant)
            .env("WTF_CONFIGURE_OPTIONS", request.configure_options().join(" "))
            .env("WTF_GLOBAL_OPTIONS", request.global_options.join(" "))
            .env("WTF_VARIANT_OPTIONS", request.variant_options.join(" "));
        for (key, value) in &request.parameters {
            cmd.env(format!("WTF_PARAM_{key}"), value);
        }
        Ok(cmd)
    }

    fn run_logged(
        &self,
        cmd: Command,
        stdin: Option<&[u8]>,
        log_path: &Path,
        label: &str,
    ) -> Result<CommandOutput> {
        let output = run_command_with_timeout(cmd, stdin, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {label}"))?;
        write_log(log_path, &output.render_log(label))?;
        if output.timed_out {
            warn!(label, timeout_secs = self.timeout.as_secs(), "collaborator timed out");
        }
        Ok(output)
    }
}

impl BuildAction for ScriptActions {
    #[instrument(skip_all, fields(package = %request.package, variant = %request.variant))]
    fn build(&self, request: &ActionRequest) -> Result<BuildOutcome> {
        info!("dispatching build");
        let cmd = self.variant_command(&self.build, request)?;
        let log_path = self.log_path(&request.package, &format!("{}.build", request.variant));
        let output = self.run_logged(cmd, None, &log_path, "build")?;
        if output.succeeded() {
            debug!("build succeeded");
            Ok(BuildOutcome::Success)
        } else {
            warn!(exit_code = ?output.status.code(), log = %log_path.display(), "build failed");
            Ok(BuildOutcome::Failure)
        }
    }
}

impl TestAction for ScriptActions {
    #[instrument(skip_all, fields(package = %request.package, variant = %request.variant))]
    fn test(&self, request: &ActionRequest) -> Result<TestOutcome> {
        info!("dispatching test");
        let cmd = self.variant_command(&self.test, request)?;
        let log_path = self.log_path(&request.package, &format!("{}.test", request.variant));
        let output = self.run_logged(cmd, None, &log_path, "test")?;
        let mut artifacts = parse_artifacts(&output.stdout_lossy());
        artifacts.push(log_path);
        let passed = output.succeeded();
        if !passed {
            warn!(exit_code = ?output.status.code(), "test failed");
        }
        Ok(TestOutcome { passed, artifacts })
    }
}

impl CheckAction for ScriptActions {
    #[instrument(skip_all, fields(package = %summary.package))]
    fn check(&self, summary: &PackageSummary) -> Result<String> {
        if self.check.is_empty() {
            return Ok(summary.render_text());
        }
        let payload = serde_json::to_vec_pretty(summary).context("serialize package summary")?;
        let mut cmd = self.command(&self.check)?;
        cmd.env("WTF_COMPILER", &summary.compiler)
            .env("WTF_PACKAGE", &summary.package);
        let log_path = self.log_path(&summary.package, "check");
        let output = self.run_logged(cmd, Some(&payload), &log_path, "check")?;
        if !output.succeeded() {
            return Err(anyhow!(
                "check script failed with status {:?} (see {})",
                output.status.code(),
                log_path.display()
            ));
        }
        Ok(output.stdout_lossy())
    }
}

fn parse_artifacts(stdout: &str) -> Vec<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix(ARTIFACT_PREFIX))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .collect()
}
