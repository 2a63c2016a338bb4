//! Version-control collaborator.
//!
//! Checkouts go through a small, explicit wrapper around `git` subprocess
//! calls. The [`SourceFetcher`] trait lets tests observe (or forbid) checkouts
//! without a network.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

/// Checks out `branch` of `url` into `dest`.
pub trait SourceFetcher {
    /// `dest` must not exist yet. Fails on an unknown URL or branch.
    fn fetch(&self, url: &str, branch: &str, dest: &Path) -> Result<()>;
}

/// Fetcher that shells out to `git`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl SourceFetcher for GitFetcher {
    #[instrument(skip_all, fields(url = %url, branch = %branch, dest = %dest.display()))]
    fn fetch(&self, url: &str, branch: &str, dest: &Path) -> Result<()> {
        info!("cloning repository");
        Git::clone_into(url, dest)?;
        let git = Git::new(dest);
        git.checkout_branch(branch)?;
        let sha = git.head_short_sha(10)?;
        info!(%sha, "checked out");
        Ok(())
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// `git clone <url> <dest>`, run from `dest`'s parent (which must exist).
    pub fn clone_into(url: &str, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = dest
            .file_name()
            .ok_or_else(|| anyhow!("clone destination {} has no name", dest.display()))?
            .to_string_lossy();
        Git::new(parent).run_checked(&["clone", "--quiet", "--", url, &name])?;
        Ok(())
    }

    /// Checkout an existing branch (local or tracking a remote one).
    #[instrument(skip_all, fields(branch = %branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", "--quiet", branch])?;
        Ok(())
    }

    /// Return the current branch name (errors on detached HEAD).
    #[cfg(test)]
    fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            return Err(anyhow!("detached HEAD in {}", self.workdir.display()));
        }
        Ok(name)
    }

    /// Return the current HEAD short SHA (stable given repo state).
    pub fn head_short_sha(&self, len: usize) -> Result<String> {
        let arg = format!("--short={len}");
        let out = self.run_capture(&["rev-parse", &arg, "HEAD"])?;
        Ok(out.trim().to_string())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
