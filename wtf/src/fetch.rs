//! Source acquisition for a run.
//!
//! Every reference is resolved before anything touches the network or the
//! working area, so a malformed reference aborts the run with no side
//! effects. Overwrites are confirmed up front for the same reason.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::error::WtfError;
use crate::io::archive::Archiver;
use crate::io::git::SourceFetcher;
use crate::io::workspace::{Confirm, PACKAGE_EXTENSION, Workspace};
use crate::source::{CodeSource, Origin, SourceDefaults, SourceReference, resolve};

/// A source package ready for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub source: CodeSource,
    /// Archive handed to the build and test collaborators.
    pub archive: PathBuf,
}

impl Package {
    pub fn name(&self) -> &str {
        &self.source.package_name
    }
}

/// How a resolved source becomes a package archive.
enum Preparation {
    Checkout { url: String, branch: String },
    ArchiveDir(PathBuf),
    InPlace(PathBuf),
}

/// Collaborators used to produce packages.
pub struct Acquisition<'a, F: ?Sized, A: ?Sized, C: ?Sized> {
    pub workspace: &'a Workspace,
    pub fetcher: &'a F,
    pub archiver: &'a A,
    pub confirm: &'a C,
}

impl<F, A, C> Acquisition<'_, F, A, C>
where
    F: SourceFetcher + ?Sized,
    A: Archiver + ?Sized,
    C: Confirm + ?Sized,
{
    /// Turn `references` into packages; with no references, every archive
    /// already in the working area is a candidate.
    #[instrument(skip_all, fields(references = references.len()))]
    pub fn acquire(
        &self,
        references: &[SourceReference],
        defaults: &SourceDefaults,
    ) -> Result<Vec<Package>> {
        if references.is_empty() {
            return self.discover();
        }

        let sources = references
            .iter()
            .map(|reference| resolve(reference, defaults))
            .collect::<Result<Vec<_>, _>>()?;
        for (index, source) in sources.iter().enumerate() {
            if sources[..index]
                .iter()
                .any(|earlier| earlier.package_name == source.package_name)
            {
                return Err(WtfError::Usage(format!(
                    "two sources resolve to package '{}'",
                    source.package_name
                ))
                .into());
            }
        }

        let plans = sources
            .iter()
            .map(preparation_for)
            .collect::<Result<Vec<_>>>()?;

        for (source, plan) in sources.iter().zip(&plans) {
            if matches!(plan, Preparation::InPlace(_)) {
                continue;
            }
            self.confirm_overwrite(&source.package_name)?;
        }

        sources
            .into_iter()
            .zip(plans)
            .map(|(source, plan)| self.prepare(source, plan))
            .collect()
    }

    fn discover(&self) -> Result<Vec<Package>> {
        let names = self.workspace.discover()?;
        if names.is_empty() {
            warn!(dir = %self.workspace.root().display(), "no packages in working area");
            return Err(WtfError::NoSource)
                .with_context(|| format!("working area {}", self.workspace.root().display()));
        }
        names
            .into_iter()
            .map(|name| {
                let archive = self.workspace.package_path(&name)?;
                Ok(Package {
                    source: CodeSource {
                        origin: Origin::Local {
                            path: archive.clone(),
                        },
                        package_name: name,
                    },
                    archive,
                })
            })
            .collect()
    }

    fn confirm_overwrite(&self, name: &str) -> Result<()> {
        if !self.workspace.has_package(name) {
            return Ok(());
        }
        let question = format!(
            "package '{name}' already exists in {}; overwrite?",
            self.workspace.root().display()
        );
        if self.confirm.confirm(&question)? {
            return Ok(());
        }
        info!(package = name, "overwrite declined");
        Err(WtfError::OverwriteDeclined {
            package: name.to_string(),
        }
        .into())
    }

    #[instrument(skip_all, fields(package = %source.package_name))]
    fn prepare(&self, source: CodeSource, plan: Preparation) -> Result<Package> {
        let archive = match plan {
            Preparation::InPlace(path) => {
                info!(archive = %path.display(), "using existing package");
                path
            }
            Preparation::ArchiveDir(dir) => {
                let _lock = self.workspace.lock_package(&source.package_name)?;
                let archive = self.workspace.package_path(&source.package_name)?;
                self.archiver.archive(&dir, &archive)?;
                info!(archive = %archive.display(), "archived local tree");
                archive
            }
            Preparation::Checkout { url, branch } => {
                let _lock = self.workspace.lock_package(&source.package_name)?;
                let staging = self.workspace.staging_dir(&source.package_name)?;
                clear_dir(&staging)?;
                if let Some(parent) = staging.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                let archive = self.workspace.package_path(&source.package_name)?;
                let produced = self
                    .fetcher
                    .fetch(&url, &branch, &staging)
                    .with_context(|| format!("check out {url} @ {branch}"))
                    .and_then(|()| self.archiver.archive(&staging, &archive));
                clear_dir(&staging)?;
                produced?;
                info!(archive = %archive.display(), "packaged checkout");
                archive
            }
        };
        Ok(Package { source, archive })
    }
}

fn preparation_for(source: &CodeSource) -> Result<Preparation> {
    match &source.origin {
        Origin::Git { url, branch, .. } => Ok(Preparation::Checkout {
            url: url.clone(),
            branch: branch.clone(),
        }),
        Origin::Local { path } if path.is_dir() => Ok(Preparation::ArchiveDir(path.clone())),
        Origin::Local { path } if path.is_file() && has_package_extension(path) => {
            Ok(Preparation::InPlace(path.clone()))
        }
        Origin::Local { path } => Err(WtfError::Usage(format!(
            "local source {} is neither a directory nor a .{PACKAGE_EXTENSION} file",
            path.display()
        ))
        .into()),
    }
}

fn has_package_extension(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(PACKAGE_EXTENSION)
}

fn clear_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).with_context(|| format!("remove {}", dir.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::exit_code_for;
    use crate::exit_codes;
    use crate::io::archive::TarArchiver;
    use crate::io::workspace::AssumeYes;
    use crate::test_support::{FixedAnswer, RecordingFetcher};

    fn acquisition<'a>(
        workspace: &'a Workspace,
        fetcher: &'a RecordingFetcher,
        confirm: &'a FixedAnswer,
    ) -> Acquisition<'a, RecordingFetcher, TarArchiver, FixedAnswer> {
        Acquisition {
            workspace,
            fetcher,
            archiver: &TarArchiver,
            confirm,
        }
    }

    #[test]
    fn branch_subpage_is_rejected_before_checkout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::yes();
        let err = acquisition(&workspace, &fetcher, &confirm)
            .acquire(
                &[
                    SourceReference::git("https://github.com/wrf-model/WRF", "master"),
                    SourceReference::git("https://github.com/acme/WRF/tree/feature-x", ""),
                ],
                &SourceDefaults::default(),
            )
            .unwrap_err();
        assert_eq!(exit_code_for(&err), exit_codes::BRANCH_SUBPAGE);
        assert!(fetcher.calls().is_empty());
        assert!(workspace.discover().expect("discover").is_empty());
    }

    #[test]
    fn checkout_is_archived_under_package_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path().join("tarballs"));
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::yes();
        let packages = acquisition(&workspace, &fetcher, &confirm)
            .acquire(
                &[SourceReference::git("https://github.com/acme/WRF", "feature/x")],
                &SourceDefaults::default(),
            )
            .expect("acquire");

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name(), "acme_feature-x");
        assert_eq!(packages[0].archive, workspace.package_path("acme_feature-x").expect("path"));
        assert!(packages[0].archive.is_file());
        assert_eq!(
            fetcher.calls(),
            vec![(
                "https://github.com/acme/WRF".to_string(),
                "feature/x".to_string()
            )]
        );
        assert!(!workspace.staging_dir("acme_feature-x").expect("path").exists());
        assert!(confirm.questions().is_empty());
    }

    #[test]
    fn declined_overwrite_aborts_before_checkout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        fs::write(workspace.package_path("master").expect("path"), "old").expect("write");
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::no();
        let err = acquisition(&workspace, &fetcher, &confirm)
            .acquire(&[SourceReference::git("", "")], &SourceDefaults::default())
            .unwrap_err();

        assert_eq!(exit_code_for(&err), exit_codes::OK);
        assert_eq!(confirm.questions().len(), 1);
        assert!(fetcher.calls().is_empty());
        assert_eq!(
            fs::read_to_string(workspace.package_path("master").expect("path")).expect("read"),
            "old"
        );
    }

    #[test]
    fn local_tar_is_used_in_place_and_dirs_are_archived() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path().join("tarballs"));
        let tar = temp.path().join("release-v4.tar");
        fs::write(&tar, "").expect("write");
        let tree = temp.path().join("my_tree");
        fs::create_dir_all(&tree).expect("mkdir");
        fs::write(tree.join("configure"), "").expect("write");

        let fetcher = RecordingFetcher::default();
        let packages = Acquisition {
            workspace: &workspace,
            fetcher: &fetcher,
            archiver: &TarArchiver,
            confirm: &AssumeYes,
        }
        .acquire(
            &[
                SourceReference::Local(tar.clone()),
                SourceReference::Local(tree),
            ],
            &SourceDefaults::default(),
        )
        .expect("acquire");

        assert_eq!(packages[0].name(), "release-v4");
        assert_eq!(packages[0].archive, tar);
        assert_eq!(packages[1].name(), "my_tree");
        assert!(workspace.package_path("my_tree").expect("path").is_file());
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn empty_working_area_is_no_source() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::yes();
        let err = acquisition(&workspace, &fetcher, &confirm)
            .acquire(&[], &SourceDefaults::default())
            .unwrap_err();
        assert_eq!(exit_code_for(&err), exit_codes::NO_SOURCE);
    }

    #[test]
    fn discovered_packages_are_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        for name in ["master.tar", "acme_fix.tar"] {
            fs::write(temp.path().join(name), "").expect("write");
        }
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::yes();
        let packages = acquisition(&workspace, &fetcher, &confirm)
            .acquire(&[], &SourceDefaults::default())
            .expect("acquire");
        let names: Vec<&str> = packages.iter().map(Package::name).collect();
        assert_eq!(names, vec!["acme_fix", "master"]);
    }

    #[test]
    fn duplicate_package_names_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::yes();
        let err = acquisition(&workspace, &fetcher, &confirm)
            .acquire(
                &[
                    SourceReference::git("", "master"),
                    SourceReference::git("https://github.com/wrf-model/WRF.git", "master"),
                ],
                &SourceDefaults::default(),
            )
            .unwrap_err();
        assert_eq!(exit_code_for(&err), exit_codes::USAGE);
        assert!(fetcher.calls().is_empty());
    }

    #[test]
    fn dot_branch_leaves_working_area_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = Workspace::new(temp.path());
        let master = workspace.package_path("master").expect("path");
        fs::write(&master, "precious").expect("write");
        let fetcher = RecordingFetcher::default();
        let confirm = FixedAnswer::no();
        let err = acquisition(&workspace, &fetcher, &confirm)
            .acquire(&[SourceReference::git("", "..")], &SourceDefaults::default())
            .unwrap_err();

        assert_eq!(exit_code_for(&err), exit_codes::BAD_REFERENCE);
        assert!(fetcher.calls().is_empty());
        assert_eq!(fs::read_to_string(&master).expect("read"), "precious");
    }
}
