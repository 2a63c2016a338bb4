//! The working area holding source packages.
//!
//! Layout:
//! ```text
//! <root>/<package>.tar        finished package archives
//! <root>/<package>.tar.lock   held while a package is being produced
//! <root>/.checkout/<package>  transient checkout staging
//! <root>/logs/<package>/      collaborator logs
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::{ReferenceProblem, WtfError};

pub const PACKAGE_EXTENSION: &str = "tar";

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create working area {}", self.root.display()))
    }

    pub fn package_path(&self, name: &str) -> Result<PathBuf, WtfError> {
        let name = checked_name(name)?;
        Ok(self.root.join(format!("{name}.{PACKAGE_EXTENSION}")))
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.package_path(name).is_ok_and(|path| path.is_file())
    }

    pub fn staging_dir(&self, name: &str) -> Result<PathBuf, WtfError> {
        let name = checked_name(name)?;
        Ok(self.root.join(".checkout").join(name))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Package names of every `*.tar` in the working area, sorted.
    pub fn discover(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("read working area {}", self.root.display()))?;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file()
                || path.extension().and_then(|ext| ext.to_str()) != Some(PACKAGE_EXTENSION)
            {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        debug!(root = %self.root.display(), count = names.len(), "discovered packages");
        Ok(names)
    }

    /// Take the exclusive lock for producing `name`.
    ///
    /// Fails with [`WtfError::PackageBusy`] while another run holds it.
    pub fn lock_package(&self, name: &str) -> Result<PackageLock> {
        let name = checked_name(name)?;
        self.ensure()?;
        let path = self
            .root
            .join(format!("{name}.{PACKAGE_EXTENSION}.lock"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Holder pid, for whoever has to clean up after a crash.
                let _ = writeln!(file, "{}", std::process::id());
                Ok(PackageLock { path })
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                Err(WtfError::PackageBusy {
                    package: name.to_string(),
                    lock: path,
                }
                .into())
            }
            Err(err) => Err(err).with_context(|| format!("create lock {}", path.display())),
        }
    }
}

/// Package names become file and directory names under the root, so each
/// must be exactly one plain path component.
fn checked_name(name: &str) -> Result<&str, WtfError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(name),
        _ => Err(WtfError::invalid_reference(name, ReferenceProblem::Shape)),
    }
}

/// Removes its lock file on drop.
#[derive(Debug)]
pub struct PackageLock {
    path: PathBuf,
}

impl PackageLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), err = %err, "failed to release package lock");
        }
    }
}

/// Asks whether an existing package may be replaced.
pub trait Confirm {
    fn confirm(&self, question: &str) -> Result<bool>;
}

/// Interactive yes/no on stdin; anything but `y`/`yes` declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> Result<bool> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question} [y/N] ")?;
        stderr.flush()?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("read confirmation")?;
        Ok(matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

/// `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}
