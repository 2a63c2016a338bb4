//! Build variants and the per-package state machine.
//!
//! A [`BuildPlan`] is created fresh for every source package. Only the
//! scheduler mutates it, and only through the legal transitions:
//!
//! ```text
//! waiting -> pending -> building -> done
//!                              \-> error
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::dependency::DependencyResolver;
use crate::core::graph::{GraphError, dependency_depth, validate_edges};
use crate::core::types::{BuildOutcome, VariantStatus};

/// A variant as declared in a test descriptor (no run state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    /// Variant-specific configure tokens, applied after the global ones.
    #[serde(default)]
    pub configure_options: Vec<String>,
}

impl VariantDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            configure_options: Vec::new(),
        }
    }
}

/// One build variant with its resolved prerequisite and current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildVariant {
    pub name: String,
    pub configure_options: Vec<String>,
    pub depends_on: Option<String>,
    status: VariantStatus,
}

impl BuildVariant {
    pub fn status(&self) -> VariantStatus {
        self.status
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown variant '{0}'")]
    UnknownVariant(String),
    #[error("variant '{variant}' cannot move from {from} to {to}")]
    Illegal {
        variant: String,
        from: VariantStatus,
        to: VariantStatus,
    },
}

fn is_legal(from: VariantStatus, to: VariantStatus) -> bool {
    use VariantStatus::{Building, Done, Error, Pending, Waiting};
    matches!(
        (from, to),
        (Waiting, Pending) | (Pending, Building) | (Building, Done) | (Building, Error)
    )
}

/// State of every declared variant for one package cycle, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    variants: Vec<BuildVariant>,
}

impl BuildPlan {
    /// Resolve prerequisites, validate the graph and assign initial states.
    pub fn new<R: DependencyResolver + ?Sized>(
        decls: &[VariantDecl],
        resolver: &R,
    ) -> Result<Self, GraphError> {
        let resolved: Vec<Option<String>> =
            decls.iter().map(|decl| resolver.resolve(&decl.name)).collect();
        let edges: Vec<(&str, Option<&str>)> = decls
            .iter()
            .zip(&resolved)
            .map(|(decl, dep)| (decl.name.as_str(), dep.as_deref()))
            .collect();
        validate_edges(&edges)?;

        let mut plan = Self {
            variants: Vec::with_capacity(decls.len()),
        };
        for (decl, depends_on) in decls.iter().zip(resolved) {
            // A prerequisite declared later has not been constructed yet; it is
            // certainly not done.
            let prerequisite = depends_on
                .as_deref()
                .map(|name| plan.status_of(name).unwrap_or(VariantStatus::Pending));
            plan.variants.push(BuildVariant {
                name: decl.name.clone(),
                configure_options: decl.configure_options.clone(),
                depends_on,
                status: VariantStatus::initial(prerequisite),
            });
        }
        Ok(plan)
    }

    pub fn variants(&self) -> &[BuildVariant] {
        &self.variants
    }

    /// Longest prerequisite chain in this plan.
    pub fn depth(&self) -> usize {
        let edges: Vec<(&str, Option<&str>)> = self
            .variants
            .iter()
            .map(|variant| (variant.name.as_str(), variant.depends_on.as_deref()))
            .collect();
        dependency_depth(&edges)
    }

    pub fn get(&self, name: &str) -> Option<&BuildVariant> {
        self.variants.iter().find(|variant| variant.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<VariantStatus> {
        self.get(name).map(BuildVariant::status)
    }

    /// Names of variants ready for dispatch, in declaration order.
    pub fn ready(&self) -> Vec<String> {
        self.names_with(VariantStatus::Pending)
    }

    pub fn names_with(&self, status: VariantStatus) -> Vec<String> {
        self.variants
            .iter()
            .filter(|variant| variant.status == status)
            .map(|variant| variant.name.clone())
            .collect()
    }

    pub fn count(&self, status: VariantStatus) -> usize {
        self.variants
            .iter()
            .filter(|variant| variant.status == status)
            .count()
    }

    /// `pending -> building`.
    pub fn start(&mut self, name: &str) -> Result<(), TransitionError> {
        self.transition(name, VariantStatus::Building)
    }

    /// `building -> done | error`, as reported by the build collaborator.
    pub fn finish(&mut self, name: &str, outcome: BuildOutcome) -> Result<(), TransitionError> {
        let to = match outcome {
            BuildOutcome::Success => VariantStatus::Done,
            BuildOutcome::Failure => VariantStatus::Error,
        };
        self.transition(name, to)
    }

    /// Move every waiting variant whose prerequisite is now done to pending.
    ///
    /// Returns the promoted names in declaration order.
    pub fn promote_waiting(&mut self) -> Vec<String> {
        let statuses: BTreeMap<String, VariantStatus> = self
            .variants
            .iter()
            .map(|variant| (variant.name.clone(), variant.status))
            .collect();
        let mut promoted = Vec::new();
        for variant in &mut self.variants {
            if variant.status != VariantStatus::Waiting {
                continue;
            }
            let prerequisite_done = variant
                .depends_on
                .as_ref()
                .is_none_or(|dep| statuses.get(dep) == Some(&VariantStatus::Done));
            if prerequisite_done {
                variant.status = VariantStatus::Pending;
                promoted.push(variant.name.clone());
            }
        }
        promoted
    }

    /// Every variant is `done` or `error`.
    pub fn is_finished(&self) -> bool {
        self.variants.iter().all(|variant| variant.status.is_terminal())
    }

    /// Nothing is pending or building, yet some variants still wait.
    ///
    /// No further pass can change anything: the remaining variants are blocked.
    pub fn is_stalled(&self) -> bool {
        self.count(VariantStatus::Pending) == 0
            && self.count(VariantStatus::Building) == 0
            && self.count(VariantStatus::Waiting) > 0
    }

    /// `(variant, prerequisite)` for every variant left waiting.
    ///
    /// Only meaningful once [`BuildPlan::is_stalled`] holds.
    pub fn blocked(&self) -> Vec<(String, Option<String>)> {
        self.variants
            .iter()
            .filter(|variant| variant.status == VariantStatus::Waiting)
            .map(|variant| (variant.name.clone(), variant.depends_on.clone()))
            .collect()
    }

    fn transition(&mut self, name: &str, to: VariantStatus) -> Result<(), TransitionError> {
        let variant = self
            .variants
            .iter_mut()
            .find(|variant| variant.name == name)
            .ok_or_else(|| TransitionError::UnknownVariant(name.to_string()))?;
        if !is_legal(variant.status, to) {
            return Err(TransitionError::Illegal {
                variant: name.to_string(),
                from: variant.status,
                to,
            });
        }
        variant.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dependency::DependencyTable;

    fn plan(names: &[&str]) -> BuildPlan {
        let decls: Vec<VariantDecl> = names.iter().map(|name| VariantDecl::new(name)).collect();
        BuildPlan::new(&decls, &DependencyTable::canonical()).expect("plan")
    }

    #[test]
    fn initial_states_follow_dependencies() {
        let plan = plan(&["em_real", "em_b_wave", "em_chem"]);
        assert_eq!(plan.status_of("em_real"), Some(VariantStatus::Pending));
        assert_eq!(plan.status_of("em_b_wave"), Some(VariantStatus::Waiting));
        assert_eq!(plan.status_of("em_chem"), Some(VariantStatus::Pending));
        assert_eq!(
            plan.get("em_b_wave").and_then(|v| v.depends_on.as_deref()),
            Some("em_real")
        );
    }

    #[test]
    fn canonical_depth_is_one() {
        assert_eq!(plan(&["em_real", "em_b_wave", "em_chem"]).depth(), 1);
        assert_eq!(plan(&["em_chem"]).depth(), 0);
    }

    #[test]
    fn prerequisite_declared_later_still_waits() {
        let plan = plan(&["em_quarter_ss8", "em_real8"]);
        assert_eq!(plan.status_of("em_quarter_ss8"), Some(VariantStatus::Waiting));
        assert_eq!(plan.ready(), vec!["em_real8".to_string()]);
    }

    #[test]
    fn missing_prerequisite_is_rejected() {
        let decls = vec![VariantDecl::new("em_b_wave")];
        let err = BuildPlan::new(&decls, &DependencyTable::canonical()).unwrap_err();
        assert!(matches!(err, GraphError::UnknownPrerequisite { .. }));
    }

    #[test]
    fn success_promotes_dependents() {
        let mut plan = plan(&["em_real", "em_b_wave"]);
        plan.start("em_real").expect("start");
        plan.finish("em_real", BuildOutcome::Success).expect("finish");
        assert_eq!(plan.promote_waiting(), vec!["em_b_wave".to_string()]);
        assert_eq!(plan.ready(), vec!["em_b_wave".to_string()]);
    }

    #[test]
    fn failure_leaves_dependents_waiting_and_stalls() {
        let mut plan = plan(&["em_real", "em_b_wave", "em_quarter_ss"]);
        plan.start("em_real").expect("start");
        plan.finish("em_real", BuildOutcome::Failure).expect("finish");
        assert!(plan.promote_waiting().is_empty());
        assert!(plan.is_stalled());
        assert!(!plan.is_finished());
        assert_eq!(
            plan.blocked(),
            vec![
                ("em_b_wave".to_string(), Some("em_real".to_string())),
                ("em_quarter_ss".to_string(), Some("em_real".to_string())),
            ]
        );
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut plan = plan(&["em_real", "em_b_wave"]);
        let err = plan.start("em_b_wave").unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                variant: "em_b_wave".to_string(),
                from: VariantStatus::Waiting,
                to: VariantStatus::Building,
            }
        );
        assert!(plan.finish("em_real", BuildOutcome::Success).is_err());
        assert_eq!(
            plan.start("nope"),
            Err(TransitionError::UnknownVariant("nope".to_string()))
        );
    }

    #[test]
    fn terminal_states_never_change() {
        let mut plan = plan(&["em_chem"]);
        plan.start("em_chem").expect("start");
        plan.finish("em_chem", BuildOutcome::Success).expect("finish");
        assert!(plan.start("em_chem").is_err());
        assert!(plan.finish("em_chem", BuildOutcome::Failure).is_err());
        assert_eq!(plan.status_of("em_chem"), Some(VariantStatus::Done));
        assert!(plan.is_finished());
    }
}
