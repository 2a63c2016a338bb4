//! Investigation tests against real remote repositories.
//!
//! These tests are ignored by default because they need network access and a
//! working `git`; a full WRF clone is large.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p wtf --test investigation_git -- --ignored
//! ```

use wtf::fetch::Acquisition;
use wtf::io::archive::TarArchiver;
use wtf::io::git::GitFetcher;
use wtf::io::workspace::AssumeYes;
use wtf::source::{SourceDefaults, SourceReference};
use wtf::test_support::temp_workspace;

#[test]
#[ignore = "needs network access to github.com"]
fn upstream_master_packages_under_branch_name() {
    let (_temp, workspace) = temp_workspace();
    let packages = Acquisition {
        workspace: &workspace,
        fetcher: &GitFetcher,
        archiver: &TarArchiver,
        confirm: &AssumeYes,
    }
    .acquire(
        &[SourceReference::git("", "")],
        &SourceDefaults::default(),
    )
    .expect("acquire upstream");

    assert_eq!(packages[0].name(), "master");
    assert!(packages[0].archive.is_file());
    assert!(!workspace.staging_dir("master").expect("path").exists());
}

#[test]
#[ignore = "needs network access to github.com"]
fn unknown_branch_fails_without_leaving_a_package() {
    let (_temp, workspace) = temp_workspace();
    let err = Acquisition {
        workspace: &workspace,
        fetcher: &GitFetcher,
        archiver: &TarArchiver,
        confirm: &AssumeYes,
    }
    .acquire(
        &[SourceReference::git("", "no-such-branch-for-wtf")],
        &SourceDefaults::default(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("no-such-branch-for-wtf"));
    assert!(!workspace.has_package("no-such-branch-for-wtf"));
}
