//! Candidate source trees and their canonical package names.
//!
//! Resolution is pure: it never touches the network or the filesystem, so a
//! malformed reference is rejected before any checkout is attempted. The same
//! reference always resolves to the same package name.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReferenceProblem, WtfError};

const URL_SCHEMES: [&str; 4] = ["https://", "http://", "ssh://", "git://"];
const SUBPAGE_SEGMENTS: [&str; 4] = ["tree", "blob", "commits", "compare"];

/// Fallbacks for references that leave the URL or branch empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefaults {
    pub upstream_url: String,
    /// Account owning the upstream repository; packages from it carry no fork prefix.
    pub upstream_account: String,
    pub default_branch: String,
}

impl Default for SourceDefaults {
    fn default() -> Self {
        Self {
            upstream_url: "https://github.com/wrf-model/WRF".to_string(),
            upstream_account: "wrf-model".to_string(),
            default_branch: "master".to_string(),
        }
    }
}

/// What the user asked to test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceReference {
    /// Repository URL plus branch; empty strings take the defaults.
    Git { url: String, branch: String },
    /// A source directory or an existing `.tar` package.
    Local(PathBuf),
}

impl SourceReference {
    pub fn git(url: &str, branch: &str) -> Self {
        SourceReference::Git {
            url: url.to_string(),
            branch: branch.to_string(),
        }
    }
}

/// Where a package's code came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Origin {
    Git {
        url: String,
        branch: String,
        fork: String,
    },
    Local {
        path: PathBuf,
    },
}

/// One candidate source tree with its canonical package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSource {
    pub origin: Origin,
    pub package_name: String,
}

impl CodeSource {
    pub fn is_version_controlled(&self) -> bool {
        matches!(self.origin, Origin::Git { .. })
    }
}

impl fmt::Display for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            Origin::Git { url, branch, .. } => {
                write!(f, "{} ({url} @ {branch})", self.package_name)
            }
            Origin::Local { path } => write!(f, "{} ({})", self.package_name, path.display()),
        }
    }
}

/// Resolve a reference into a [`CodeSource`].
pub fn resolve(
    reference: &SourceReference,
    defaults: &SourceDefaults,
) -> Result<CodeSource, WtfError> {
    match reference {
        SourceReference::Git { url, branch } => resolve_git(url, branch, defaults),
        SourceReference::Local(path) => resolve_local(path),
    }
}

fn resolve_git(
    url: &str,
    branch: &str,
    defaults: &SourceDefaults,
) -> Result<CodeSource, WtfError> {
    let url = if url.is_empty() {
        defaults.upstream_url.as_str()
    } else {
        url
    };
    let branch = if branch.is_empty() {
        defaults.default_branch.as_str()
    } else {
        branch
    };
    for value in [url, branch] {
        if value.chars().any(char::is_whitespace) {
            return Err(WtfError::invalid_reference(
                value,
                ReferenceProblem::Whitespace,
            ));
        }
    }
    if branch.starts_with('-') || !is_branch_shape(branch) {
        return Err(WtfError::invalid_reference(branch, ReferenceProblem::Shape));
    }

    let fork = fork_of(url)?;
    let branch_component = branch.replace('/', "-");
    let package_name = if fork.eq_ignore_ascii_case(&defaults.upstream_account) {
        branch_component
    } else {
        format!("{fork}_{branch_component}")
    };

    Ok(CodeSource {
        origin: Origin::Git {
            url: url.to_string(),
            branch: branch.to_string(),
            fork,
        },
        package_name,
    })
}

/// Loose `git check-ref-format` subset: no empty, `.`-led or `.lock`
/// components and no `..` anywhere.
fn is_branch_shape(branch: &str) -> bool {
    !branch.contains("..")
        && !branch.ends_with('.')
        && branch.split('/').all(|component| {
            !component.is_empty() && !component.starts_with('.') && !component.ends_with(".lock")
        })
}

/// Owning account of a repository URL.
///
/// Accepts `scheme://host/<fork>/<repo>` and scp-like `user@host:<fork>/<repo>`.
fn fork_of(url: &str) -> Result<String, WtfError> {
    let shape = || WtfError::invalid_reference(url, ReferenceProblem::Shape);

    let scheme_rest = URL_SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme));
    let path = if let Some(rest) = scheme_rest {
        let (host, path) = rest.split_once('/').ok_or_else(shape)?;
        if host.is_empty() {
            return Err(shape());
        }
        path
    } else if let Some((host, path)) = url.split_once(':') {
        if host.is_empty() || host.contains('/') {
            return Err(shape());
        }
        path
    } else {
        return Err(shape());
    };

    let segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    let [fork, repo, rest @ ..] = segments.as_slice() else {
        return Err(shape());
    };
    if fork.is_empty() || repo.trim_end_matches(".git").is_empty() {
        return Err(shape());
    }
    match rest.first() {
        None => Ok(fork.to_string()),
        Some(segment) if SUBPAGE_SEGMENTS.contains(segment) => Err(WtfError::invalid_reference(
            url,
            ReferenceProblem::BranchSubpage,
        )),
        Some(_) => Err(shape()),
    }
}

fn resolve_local(path: &Path) -> Result<CodeSource, WtfError> {
    let display = path.display().to_string();
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| WtfError::invalid_reference(&display, ReferenceProblem::Shape))?;
    let name = name.strip_suffix(".tar").unwrap_or(name);
    if name.is_empty() {
        return Err(WtfError::invalid_reference(&display, ReferenceProblem::Shape));
    }
    Ok(CodeSource {
        origin: Origin::Local {
            path: path.to_path_buf(),
        },
        package_name: name.to_string(),
    })
}
