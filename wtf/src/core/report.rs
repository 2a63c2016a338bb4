//! Per-package summaries and the aggregate run report.
//!
//! Counts are always derived from the variant lists; nothing here keeps
//! running totals.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::{TestOutcome, VariantStatus};
use crate::core::variant::BuildPlan;

/// Final record of one variant in one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantReport {
    pub name: String,
    pub depends_on: Option<String>,
    pub status: VariantStatus,
    /// Prerequisite this variant was left waiting on, if it never became ready.
    pub blocked_on: Option<String>,
    /// Test-run outcome; only `done` variants are tested.
    pub test: Option<TestOutcome>,
}

impl VariantReport {
    pub fn is_blocked(&self) -> bool {
        self.status == VariantStatus::Waiting
    }
}

/// Build, test and check outcomes for one source package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub package: String,
    pub compiler: String,
    pub variants: Vec<VariantReport>,
    /// Human-readable summary produced by the check collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_summary: Option<String>,
}

impl PackageSummary {
    /// Snapshot a settled plan plus the test outcomes collected for it.
    pub fn from_plan(
        package: &str,
        compiler: &str,
        plan: &BuildPlan,
        tests: &BTreeMap<String, TestOutcome>,
    ) -> Self {
        let variants = plan
            .variants()
            .iter()
            .map(|variant| {
                let status = variant.status();
                VariantReport {
                    name: variant.name.clone(),
                    depends_on: variant.depends_on.clone(),
                    status,
                    blocked_on: if status == VariantStatus::Waiting {
                        variant.depends_on.clone()
                    } else {
                        None
                    },
                    test: tests.get(&variant.name).cloned(),
                }
            })
            .collect();
        Self {
            package: package.to_string(),
            compiler: compiler.to_string(),
            variants,
            check_summary: None,
        }
    }

    pub fn count(&self, status: VariantStatus) -> usize {
        self.variants
            .iter()
            .filter(|variant| variant.status == status)
            .count()
    }

    pub fn errored(&self) -> Vec<&VariantReport> {
        self.variants
            .iter()
            .filter(|variant| variant.status == VariantStatus::Error)
            .collect()
    }

    pub fn blocked(&self) -> Vec<&VariantReport> {
        self.variants
            .iter()
            .filter(|variant| variant.is_blocked())
            .collect()
    }

    pub fn tests_failed(&self) -> usize {
        self.variants
            .iter()
            .filter(|variant| variant.test.as_ref().is_some_and(|test| !test.passed))
            .count()
    }

    /// A package fails when any variant errored or was left blocked.
    pub fn is_failure(&self) -> bool {
        self.variants
            .iter()
            .any(|variant| variant.status == VariantStatus::Error || variant.is_blocked())
    }

    /// Plain-text table used as the built-in check summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "package {} (compiler {}): {} done, {} error, {} blocked, {} test failures",
            self.package,
            self.compiler,
            self.count(VariantStatus::Done),
            self.errored().len(),
            self.blocked().len(),
            self.tests_failed(),
        );
        let width = self
            .variants
            .iter()
            .map(|variant| variant.name.len())
            .max()
            .unwrap_or(0);
        for variant in &self.variants {
            let state = match (&variant.blocked_on, variant.status) {
                (Some(prerequisite), VariantStatus::Waiting) => {
                    format!("blocked (waiting on {prerequisite})")
                }
                (None, VariantStatus::Waiting) => "blocked".to_string(),
                (_, status) => status.to_string(),
            };
            let test = match &variant.test {
                Some(test) if test.passed => "  test pass",
                Some(_) => "  test FAIL",
                None => "",
            };
            let _ = writeln!(out, "  {:<width$}  {state}{test}", variant.name);
        }
        out
    }
}

/// Everything one invocation did, across all packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub compiler: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub packages: Vec<PackageSummary>,
}

impl RunReport {
    pub fn is_failure(&self) -> bool {
        self.packages.iter().any(PackageSummary::is_failure)
    }

    pub fn failed_packages(&self) -> Vec<&str> {
        self.packages
            .iter()
            .filter(|package| package.is_failure())
            .map(|package| package.package.as_str())
            .collect()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for package in &self.packages {
            match &package.check_summary {
                Some(summary) => out.push_str(summary),
                None => out.push_str(&package.render_text()),
            }
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        let failed = self.failed_packages();
        let _ = writeln!(
            out,
            "run: compiler={} packages={} failed={} result={}",
            self.compiler,
            self.packages.len(),
            failed.len(),
            if failed.is_empty() { "ok" } else { "FAIL" }
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::DependencyTable;
    use crate::core::types::BuildOutcome;
    use crate::core::variant::VariantDecl;

    fn failed_real_plan() -> BuildPlan {
        let decls: Vec<VariantDecl> = ["em_real", "em_b_wave", "em_chem"]
            .iter()
            .map(|name| VariantDecl::new(name))
            .collect();
        let mut plan = BuildPlan::new(&decls, &DependencyTable::canonical()).expect("plan");
        for name in ["em_real", "em_chem"] {
            plan.start(name).expect("start");
        }
        plan.finish("em_real", BuildOutcome::Failure).expect("finish");
        plan.finish("em_chem", BuildOutcome::Success).expect("finish");
        plan
    }

    #[test]
    fn summary_marks_blocked_variants() {
        let tests = BTreeMap::from([("em_chem".to_string(), TestOutcome::pass())]);
        let summary = PackageSummary::from_plan("master", "gnu", &failed_real_plan(), &tests);

        assert!(summary.is_failure());
        assert_eq!(summary.errored().len(), 1);
        let blocked = summary.blocked();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].name, "em_b_wave");
        assert_eq!(blocked[0].blocked_on.as_deref(), Some("em_real"));
        assert_eq!(summary.count(VariantStatus::Done), 1);
    }

    #[test]
    fn text_lists_every_variant() {
        let tests = BTreeMap::from([("em_chem".to_string(), TestOutcome::fail())]);
        let summary = PackageSummary::from_plan("acme_fix", "intel", &failed_real_plan(), &tests);
        let text = summary.render_text();

        assert!(text.contains("package acme_fix (compiler intel)"));
        assert!(text.contains("blocked (waiting on em_real)"));
        assert!(text.contains("test FAIL"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn run_fails_if_any_package_fails() {
        let now = Utc::now();
        let failing = PackageSummary::from_plan("a", "gnu", &failed_real_plan(), &BTreeMap::new());
        let report = RunReport {
            compiler: "gnu".to_string(),
            started_at: now,
            finished_at: now,
            packages: vec![failing],
        };
        assert!(report.is_failure());
        assert_eq!(report.failed_packages(), vec!["a"]);
        assert!(report.render_text().contains("result=FAIL"));
    }
}
