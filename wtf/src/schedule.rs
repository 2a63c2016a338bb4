//! The build scheduler: one build/test/check cycle per source package.
//!
//! Within a package, every `pending` variant of a pass is dispatched
//! concurrently and the scheduler waits for the whole batch before promoting
//! dependents. Passes repeat until nothing is pending; whatever is still
//! waiting at that point is blocked for good.

use std::collections::BTreeMap;
use std::thread;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::core::dependency::DependencyResolver;
use crate::core::report::{PackageSummary, RunReport};
use crate::core::types::{BuildOutcome, TestOutcome, VariantStatus};
use crate::core::variant::BuildPlan;
use crate::descriptor::TestDescriptor;
use crate::error::WtfError;
use crate::fetch::Package;
use crate::io::actions::{ActionRequest, BuildAction, CheckAction, TestAction};

/// Drives every declared variant of a descriptor through its state machine,
/// package by package.
pub struct BuildScheduler<'a, R: ?Sized, B: ?Sized, T: ?Sized, C: ?Sized> {
    descriptor: &'a TestDescriptor,
    resolver: &'a R,
    builder: &'a B,
    tester: &'a T,
    checker: &'a C,
}

impl<'a, R, B, T, C> BuildScheduler<'a, R, B, T, C>
where
    R: DependencyResolver + ?Sized,
    B: BuildAction + ?Sized,
    T: TestAction + ?Sized,
    C: CheckAction + ?Sized,
{
    pub fn new(
        descriptor: &'a TestDescriptor,
        resolver: &'a R,
        builder: &'a B,
        tester: &'a T,
        checker: &'a C,
    ) -> Self {
        Self {
            descriptor,
            resolver,
            builder,
            tester,
            checker,
        }
    }

    /// Build, test and check every package in order.
    ///
    /// Fails before any dispatch when there are no packages or the
    /// dependency graph is invalid. Build and test failures never fail this
    /// call; they end up in the report.
    #[instrument(skip_all, fields(compiler = %self.descriptor.compiler, packages = packages.len()))]
    pub fn run(&self, packages: &[Package]) -> Result<RunReport> {
        if packages.is_empty() {
            return Err(WtfError::NoSource.into());
        }
        self.plan()?;

        let started_at = Utc::now();
        info!(started_at = %started_at.to_rfc3339(), "run started");
        let mut summaries = Vec::with_capacity(packages.len());
        for package in packages {
            summaries.push(self.run_package(package)?);
        }
        let finished_at = Utc::now();

        let report = RunReport {
            compiler: self.descriptor.compiler.clone(),
            started_at,
            finished_at,
            packages: summaries,
        };
        info!(
            finished_at = %finished_at.to_rfc3339(),
            failed = report.failed_packages().len(),
            "run finished"
        );
        Ok(report)
    }

    /// Fresh plan for one package cycle.
    pub fn plan(&self) -> Result<BuildPlan, WtfError> {
        Ok(BuildPlan::new(&self.descriptor.variants, self.resolver)?)
    }

    /// One full build/test/check cycle.
    #[instrument(skip_all, fields(package = %package.name()))]
    pub fn run_package(&self, package: &Package) -> Result<PackageSummary> {
        let mut plan = self.plan()?;
        let passes = self.drive_builds(&mut plan, package)?;
        for (variant, prerequisite) in plan.blocked() {
            warn!(
                %variant,
                prerequisite = prerequisite.as_deref().unwrap_or("-"),
                "variant blocked"
            );
        }
        info!(
            passes,
            done = plan.count(VariantStatus::Done),
            error = plan.count(VariantStatus::Error),
            blocked = plan.count(VariantStatus::Waiting),
            "builds settled"
        );

        let tests = self.run_tests(&plan, package);
        let mut summary =
            PackageSummary::from_plan(package.name(), &self.descriptor.compiler, &plan, &tests);
        summary.check_summary = match self.checker.check(&summary) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "check action failed");
                None
            }
        };
        Ok(summary)
    }

    /// Repeat build passes until nothing is pending. Returns the number of
    /// passes that dispatched anything.
    ///
    /// On return no variant is `pending` or `building`: the plan is either
    /// finished or stalled.
    pub fn drive_builds(&self, plan: &mut BuildPlan, package: &Package) -> Result<usize> {
        let mut passes = 0;
        loop {
            let ready = plan.ready();
            if ready.is_empty() {
                break;
            }
            passes += 1;
            debug!(pass = passes, variants = ?ready, "dispatching builds");

            let mut requests = Vec::with_capacity(ready.len());
            for name in &ready {
                requests.push(self.request(plan, package, name));
                plan.start(name)?;
            }
            for (name, outcome) in ready.iter().zip(self.dispatch_builds(&requests)) {
                plan.finish(name, outcome)?;
            }

            let promoted = plan.promote_waiting();
            if !promoted.is_empty() {
                debug!(pass = passes, variants = ?promoted, "promoted to pending");
            }
        }
        Ok(passes)
    }

    fn dispatch_builds(&self, requests: &[ActionRequest]) -> Vec<BuildOutcome> {
        let builder = self.builder;
        thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|request| scope.spawn(move || build_one(builder, request)))
                .collect();
            handles
                .into_iter()
                .zip(requests)
                .map(|(handle, request)| {
                    handle.join().unwrap_or_else(|_| {
                        error!(variant = %request.variant, "build dispatch panicked");
                        BuildOutcome::Failure
                    })
                })
                .collect()
        })
    }

    /// Test every `done` variant, concurrently.
    fn run_tests(&self, plan: &BuildPlan, package: &Package) -> BTreeMap<String, TestOutcome> {
        let requests: Vec<ActionRequest> = plan
            .names_with(VariantStatus::Done)
            .iter()
            .map(|name| self.request(plan, package, name))
            .collect();
        let tester = self.tester;
        thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|request| scope.spawn(move || test_one(tester, request)))
                .collect();
            handles
                .into_iter()
                .zip(&requests)
                .map(|(handle, request)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        error!(variant = %request.variant, "test dispatch panicked");
                        TestOutcome::fail()
                    });
                    (request.variant.clone(), outcome)
                })
                .collect()
        })
    }

    fn request(&self, plan: &BuildPlan, package: &Package, variant: &str) -> ActionRequest {
        ActionRequest {
            compiler: self.descriptor.compiler.clone(),
            package: package.name().to_string(),
            package_path: package.archive.clone(),
            variant: variant.to_string(),
            variant_options: plan
                .get(variant)
                .map(|variant| variant.configure_options.clone())
                .unwrap_or_default(),
            global_options: self.descriptor.configure_options.clone(),
            parameters: self.descriptor.parameters.clone(),
        }
    }
}

/// A collaborator that cannot run reports failure like one that ran and failed.
fn build_one<B: BuildAction + ?Sized>(builder: &B, request: &ActionRequest) -> BuildOutcome {
    match builder.build(request) {
        Ok(outcome) => {
            debug!(variant = %request.variant, ?outcome, "build reported");
            outcome
        }
        Err(err) => {
            warn!(variant = %request.variant, err = %format!("{err:#}"), "build action failed");
            BuildOutcome::Failure
        }
    }
}

fn test_one<T: TestAction + ?Sized>(tester: &T, request: &ActionRequest) -> TestOutcome {
    match tester.test(request) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(variant = %request.variant, err = %format!("{err:#}"), "test action failed");
            TestOutcome::fail()
        }
    }
}
