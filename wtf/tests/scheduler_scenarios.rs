//! End-to-end scheduler scenarios with scripted collaborators.
//!
//! These drive `BuildScheduler::run` over one or more packages and check the
//! final variant states, dispatch ordering and run-level outcome.

use std::collections::BTreeSet;

use wtf::core::dependency::{DependencyRule, DependencyTable};
use wtf::core::report::PackageSummary;
use wtf::core::types::VariantStatus;
use wtf::descriptor::TestDescriptor;
use wtf::schedule::BuildScheduler;
use wtf::test_support::{ActionEvent, ScriptedActions, descriptor, package};

fn status(summary: &PackageSummary, variant: &str) -> VariantStatus {
    summary
        .variants
        .iter()
        .find(|report| report.name == variant)
        .map(|report| report.status)
        .expect("variant in summary")
}

fn finished(package: &str, variant: &str) -> ActionEvent {
    ActionEvent::BuildFinished {
        package: package.to_string(),
        variant: variant.to_string(),
    }
}

fn started(package: &str, variant: &str) -> ActionEvent {
    ActionEvent::BuildStarted {
        package: package.to_string(),
        variant: variant.to_string(),
    }
}

/// `em_b_wave` is dispatched only once `em_real` is done; all three finish.
#[test]
fn dependent_variant_waits_for_prerequisite() {
    let descriptor = descriptor("gnu", &["em_real", "em_b_wave", "em_chem"]);
    let resolver = DependencyTable::canonical();
    let actions = ScriptedActions::new();

    let report = BuildScheduler::new(&descriptor, &resolver, &actions, &actions, &actions)
        .run(&[package("master")])
        .expect("run");

    let summary = &report.packages[0];
    for variant in ["em_real", "em_b_wave", "em_chem"] {
        assert_eq!(status(summary, variant), VariantStatus::Done, "{variant}");
    }
    let real_done = actions
        .position(&finished("master", "em_real"))
        .expect("em_real finished");
    let wave_start = actions
        .position(&started("master", "em_b_wave"))
        .expect("em_b_wave started");
    assert!(real_done < wave_start);
    assert_eq!(
        actions.tested(),
        BTreeSet::from([
            "em_real".to_string(),
            "em_b_wave".to_string(),
            "em_chem".to_string()
        ])
    );
    assert!(!report.is_failure());
}

/// A failed prerequisite leaves its dependents blocked and fails the run.
#[test]
fn failed_prerequisite_blocks_dependents() {
    let descriptor = descriptor("gnu", &["em_real", "em_b_wave", "em_quarter_ss"]);
    let resolver = DependencyTable::canonical();
    let actions = ScriptedActions::new().fail_build("em_real");

    let report = BuildScheduler::new(&descriptor, &resolver, &actions, &actions, &actions)
        .run(&[package("master")])
        .expect("run");

    let summary = &report.packages[0];
    assert_eq!(status(summary, "em_real"), VariantStatus::Error);
    assert_eq!(status(summary, "em_b_wave"), VariantStatus::Waiting);
    assert_eq!(status(summary, "em_quarter_ss"), VariantStatus::Waiting);
    let blocked: Vec<(&str, Option<&str>)> = summary
        .blocked()
        .iter()
        .map(|report| (report.name.as_str(), report.blocked_on.as_deref()))
        .collect();
    assert_eq!(
        blocked,
        vec![
            ("em_b_wave", Some("em_real")),
            ("em_quarter_ss", Some("em_real"))
        ]
    );
    assert_eq!(actions.built(), vec!["em_real"]);
    assert!(actions.tested().is_empty());
    assert!(report.is_failure());
    assert_eq!(report.failed_packages(), vec!["master"]);
    assert!(report.render_text().contains("blocked (waiting on em_real)"));
}

/// Failures stay inside their subgraph; siblings build and test normally.
#[test]
fn failure_does_not_stop_independent_variants() {
    let descriptor = descriptor(
        "intel",
        &["em_real", "em_b_wave", "em_real8", "em_quarter_ss8", "em_chem"],
    );
    let resolver = DependencyTable::canonical();
    let actions = ScriptedActions::new()
        .fail_build("em_real8")
        .fail_test("em_chem");

    let report = BuildScheduler::new(&descriptor, &resolver, &actions, &actions, &actions)
        .run(&[package("master")])
        .expect("run");

    let summary = &report.packages[0];
    assert_eq!(status(summary, "em_real"), VariantStatus::Done);
    assert_eq!(status(summary, "em_b_wave"), VariantStatus::Done);
    assert_eq!(status(summary, "em_chem"), VariantStatus::Done);
    assert_eq!(status(summary, "em_real8"), VariantStatus::Error);
    assert_eq!(status(summary, "em_quarter_ss8"), VariantStatus::Waiting);
    assert_eq!(summary.tests_failed(), 1);
    assert!(report.is_failure());
}

/// Test failures are reported but do not fail the run on their own.
#[test]
fn test_failure_alone_does_not_fail_run() {
    let descriptor = descriptor("gnu", &["em_real", "em_chem"]);
    let resolver = DependencyTable::canonical();
    let actions = ScriptedActions::new().fail_test("em_chem");

    let report = BuildScheduler::new(&descriptor, &resolver, &actions, &actions, &actions)
        .run(&[package("master")])
        .expect("run");

    assert_eq!(report.packages[0].tests_failed(), 1);
    assert!(!report.is_failure());
}

/// Every package gets its own fresh cycle; an error in one does not leak
/// into the next.
#[test]
fn packages_are_processed_independently() {
    let descriptor = descriptor("gnu", &["em_real", "em_b_wave"]);
    let resolver = DependencyTable::canonical();
    let actions = ScriptedActions::new();

    let report = BuildScheduler::new(&descriptor, &resolver, &actions, &actions, &actions)
        .run(&[package("acme_fix"), package("master")])
        .expect("run");

    let names: Vec<&str> = report
        .packages
        .iter()
        .map(|summary| summary.package.as_str())
        .collect();
    assert_eq!(names, vec!["acme_fix", "master"]);
    let last_acme = actions
        .events()
        .iter()
        .rposition(|event| {
            matches!(event, ActionEvent::Check { package } if package == "acme_fix")
        })
        .expect("acme_fix checked");
    let first_master = actions
        .position(&started("master", "em_real"))
        .expect("master built");
    assert!(last_acme < first_master);
    assert!(report.packages.iter().all(|summary| !summary.is_failure()));
}

/// Terminates within depth + 1 passes for a chain deeper than the canonical
/// table, and blocks the whole chain below a failure.
#[test]
fn deep_chain_terminates_and_blocks_transitively() {
    let resolver = DependencyTable::canonical_with(&[
        DependencyRule::new("nmm_nest", "nmm_real"),
        DependencyRule::new("nmm_real", "em_real"),
    ]);
    let descriptor: TestDescriptor = descriptor("pgi", &["nmm_nest", "nmm_real", "em_real"]);

    let ok = ScriptedActions::new();
    let scheduler = BuildScheduler::new(&descriptor, &resolver, &ok, &ok, &ok);
    let mut plan = scheduler.plan().expect("plan");
    let passes = scheduler
        .drive_builds(&mut plan, &package("master"))
        .expect("drive");
    assert!(passes <= plan.depth() + 1);
    assert!(plan.is_finished());

    let failing = ScriptedActions::new().fail_build("em_real");
    let report = BuildScheduler::new(&descriptor, &resolver, &failing, &failing, &failing)
        .run(&[package("master")])
        .expect("run");
    let summary = &report.packages[0];
    assert_eq!(status(summary, "nmm_real"), VariantStatus::Waiting);
    assert_eq!(status(summary, "nmm_nest"), VariantStatus::Waiting);
    assert_eq!(summary.blocked().len(), 2);
    assert_eq!(failing.built(), vec!["em_real"]);
}
