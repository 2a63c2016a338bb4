//! Driver configuration stored in `wtf.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::dependency::{DependencyRule, DependencyTable};
use crate::source::SourceDefaults;

pub const DEFAULT_CONFIG_FILE: &str = "wtf.toml";

/// Driver configuration (TOML).
///
/// Intended to be edited by humans, one file per machine. Missing fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WtfConfig {
    /// Working area holding source packages (`<name>.tar`). A descriptor's
    /// `TARFILE_DIR` takes precedence.
    pub work_dir: PathBuf,

    /// Repository used when a reference leaves the URL empty.
    pub upstream_url: String,

    /// Owner of the upstream repository; its packages carry no fork prefix.
    pub upstream_account: String,

    /// Branch used when a reference leaves the branch empty.
    pub default_branch: String,

    /// Upper bound for any single collaborator invocation, in seconds.
    pub action_timeout_secs: u64,

    /// Truncate captured collaborator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub actions: ActionsConfig,

    /// Extra environment for every collaborator (toolchain setup, `TMPDIR`, ...).
    pub env: BTreeMap<String, String>,

    /// Dependency rules evaluated before the built-in table.
    pub dependencies: Vec<DependencyRule>,
}

/// Commands for the external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ActionsConfig {
    /// Configure and compile one variant of one package.
    pub build: Vec<String>,
    /// Run the regression test of one built variant.
    pub test: Vec<String>,
    /// Summarize one package; empty uses the built-in text summary.
    pub check: Vec<String>,
    /// Prefix for batch submission (e.g. `["bsub", "-K"]`); empty runs locally.
    /// The submission must block until the job finishes.
    pub submit: Vec<String>,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            build: vec!["scripts/allBuild.sh".to_string()],
            test: vec!["scripts/allTest.sh".to_string()],
            check: Vec::new(),
            submit: Vec::new(),
        }
    }
}

impl Default for WtfConfig {
    fn default() -> Self {
        let sources = SourceDefaults::default();
        Self {
            work_dir: PathBuf::from("tarballs"),
            upstream_url: sources.upstream_url,
            upstream_account: sources.upstream_account,
            default_branch: sources.default_branch,
            action_timeout_secs: 6 * 60 * 60,
            output_limit_bytes: 1_000_000,
            actions: ActionsConfig::default(),
            env: BTreeMap::new(),
            dependencies: Vec::new(),
        }
    }
}

impl WtfConfig {
    pub fn validate(&self) -> Result<()> {
        if self.action_timeout_secs == 0 {
            return Err(anyhow!("action_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(anyhow!("work_dir must not be empty"));
        }
        if self.upstream_url.trim().is_empty() || self.upstream_account.trim().is_empty() {
            return Err(anyhow!("upstream_url and upstream_account must be set"));
        }
        if self.default_branch.trim().is_empty() {
            return Err(anyhow!("default_branch must be set"));
        }
        for (label, command) in [
            ("actions.build", &self.actions.build),
            ("actions.test", &self.actions.test),
        ] {
            if command.is_empty() || command[0].trim().is_empty() {
                return Err(anyhow!("{label} must be a non-empty array"));
            }
        }
        if self.actions.check.first().is_some_and(|arg| arg.trim().is_empty()) {
            return Err(anyhow!("actions.check must start with a program"));
        }
        if self.actions.submit.first().is_some_and(|arg| arg.trim().is_empty()) {
            return Err(anyhow!("actions.submit must start with a program"));
        }
        for rule in &self.dependencies {
            if rule.contains.is_empty() || rule.depends_on.is_empty() {
                return Err(anyhow!(
                    "dependency rules need non-empty `contains` and `depends_on`"
                ));
            }
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }

    pub fn source_defaults(&self) -> SourceDefaults {
        SourceDefaults {
            upstream_url: self.upstream_url.clone(),
            upstream_account: self.upstream_account.clone(),
            default_branch: self.default_branch.clone(),
        }
    }

    pub fn dependency_table(&self) -> DependencyTable {
        DependencyTable::canonical_with(&self.dependencies)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `WtfConfig::default()`.
pub fn load_config(path: &Path) -> Result<WtfConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = WtfConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: WtfConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::DependencyResolver;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, WtfConfig::default());
    }

    #[test]
    fn load_reads_partial_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("wtf.toml");
        fs::write(
            &path,
            r#"
work_dir = "/glade/scratch/tarballs"
action_timeout_secs = 60

[actions]
build = ["scripts/build.sh", "--quiet"]
submit = ["bsub", "-K"]

[env]
TMPDIR = "/glade/scratch/tmp"

[[dependencies]]
contains = "em_hill2d"
depends_on = "em_real"
"#,
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.work_dir, PathBuf::from("/glade/scratch/tarballs"));
        assert_eq!(cfg.action_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.actions.submit, vec!["bsub", "-K"]);
        assert_eq!(cfg.actions.test, ActionsConfig::default().test);
        assert_eq!(
            cfg.env.get("TMPDIR").map(String::as_str),
            Some("/glade/scratch/tmp")
        );
        assert_eq!(
            cfg.dependency_table().resolve("em_hill2d_x").as_deref(),
            Some("em_real")
        );
        assert_eq!(cfg.source_defaults(), SourceDefaults::default());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("wtf.toml");
        fs::write(&path, "action_timeout_secs = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("action_timeout_secs"));
    }

    #[test]
    fn empty_build_command_is_rejected() {
        let cfg = WtfConfig {
            actions: ActionsConfig {
                build: Vec::new(),
                ..ActionsConfig::default()
            },
            ..WtfConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
