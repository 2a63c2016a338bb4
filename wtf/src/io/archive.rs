//! Archive collaborator: packs a source tree into a single `.tar` package.

use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Directory name the source tree gets inside every package archive; the
/// build scripts unpack and `cd` into it.
pub const ARCHIVE_ROOT: &str = "WRFV3";

pub trait Archiver {
    /// Pack `source_tree` into the archive file `dest`.
    ///
    /// Fails if `source_tree` is not a directory.
    fn archive(&self, source_tree: &Path, dest: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TarArchiver;

impl Archiver for TarArchiver {
    #[instrument(skip_all, fields(source = %source_tree.display(), dest = %dest.display()))]
    fn archive(&self, source_tree: &Path, dest: &Path) -> Result<()> {
        if !source_tree.is_dir() {
            return Err(anyhow!(
                "source tree {} does not exist",
                source_tree.display()
            ));
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }

        // Build next to the destination and rename, so a half-written archive
        // never looks like a finished package.
        let partial = dest.with_extension("tar.partial");
        let written = write_tar(source_tree, &partial)
            .and_then(|()| {
                fs::rename(&partial, dest).with_context(|| format!("replace {}", dest.display()))
            });
        if written.is_err()
            && partial.exists()
            && let Err(err) = fs::remove_file(&partial)
        {
            warn!(partial = %partial.display(), err = %err, "failed to remove partial archive");
        }
        written?;
        debug!("archive written");
        Ok(())
    }
}

fn write_tar(source_tree: &Path, partial: &Path) -> Result<()> {
    let file = File::create(partial).with_context(|| format!("create {}", partial.display()))?;
    let mut builder = tar::Builder::new(file);
    builder.follow_symlinks(false);
    builder
        .append_dir_all(ARCHIVE_ROOT, source_tree)
        .with_context(|| format!("archive {}", source_tree.display()))?;
    builder
        .into_inner()
        .with_context(|| format!("finish {}", partial.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archives_tree_under_root_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = temp.path().join("checkout");
        fs::create_dir_all(tree.join("dyn_em")).expect("mkdir");
        fs::write(tree.join("configure"), "#!/bin/sh\n").expect("write");
        fs::write(tree.join("dyn_em").join("module_em.F"), "! em\n").expect("write");

        let dest = temp.path().join("tarballs").join("master.tar");
        TarArchiver.archive(&tree, &dest).expect("archive");
        assert!(dest.exists());
        assert!(!dest.with_extension("tar.partial").exists());

        let mut archive = tar::Archive::new(File::open(&dest).expect("open"));
        let names: Vec<String> = archive
            .entries()
            .expect("entries")
            .map(|entry| {
                entry
                    .expect("entry")
                    .path()
                    .expect("path")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert!(names.iter().any(|name| name == "WRFV3/configure"));
        assert!(names.iter().any(|name| name == "WRFV3/dyn_em/module_em.F"));
    }

    #[test]
    fn missing_tree_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = TarArchiver
            .archive(&temp.path().join("absent"), &temp.path().join("x.tar"))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn failed_archive_leaves_no_partial_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tree = temp.path().join("checkout");
        fs::create_dir_all(&tree).expect("mkdir");
        fs::write(tree.join("configure"), "").expect("write");
        // A directory in the way makes the final rename fail.
        let dest = temp.path().join("master.tar");
        fs::create_dir_all(dest.join("occupied")).expect("mkdir");

        TarArchiver.archive(&tree, &dest).unwrap_err();
        assert!(!dest.with_extension("tar.partial").exists());
        assert!(dest.join("occupied").is_dir());
    }
}
