//! Build-variant dependency resolution.
//!
//! A variant's prerequisite is decided purely from its name by an ordered
//! table of substring rules (first match wins). The canonical WRF table is
//! built in; extra rules can be layered in front of it from configuration.

use serde::{Deserialize, Serialize};

/// Maps a build-variant name to the variant it must wait for.
pub trait DependencyResolver {
    /// Name of the prerequisite variant, or `None` if `variant` builds on its own.
    fn resolve(&self, variant: &str) -> Option<String>;
}

/// One substring rule: a variant whose name contains `contains` (and not
/// `unless`, when given) depends on `depends_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRule {
    pub contains: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unless: Option<String>,
    pub depends_on: String,
}

impl DependencyRule {
    pub fn new(contains: &str, depends_on: &str) -> Self {
        Self {
            contains: contains.to_string(),
            unless: None,
            depends_on: depends_on.to_string(),
        }
    }

    pub fn unless(mut self, excluded: &str) -> Self {
        self.unless = Some(excluded.to_string());
        self
    }

    pub fn matches(&self, variant: &str) -> bool {
        if !variant.contains(&self.contains) {
            return false;
        }
        match &self.unless {
            Some(excluded) => !variant.contains(excluded.as_str()),
            None => true,
        }
    }
}

/// Ordered rule table; evaluation stops at the first matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DependencyTable {
    rules: Vec<DependencyRule>,
}

impl DependencyTable {
    pub fn new(rules: Vec<DependencyRule>) -> Self {
        Self { rules }
    }

    /// The WRF variant table.
    ///
    /// `em_quarter_ss8` shares a prefix with `em_quarter_ss`, so the shorter
    /// rule excludes it explicitly rather than relying on rule order.
    pub fn canonical() -> Self {
        Self::new(vec![
            DependencyRule::new("em_b_wave", "em_real"),
            DependencyRule::new("em_quarter_ss", "em_real").unless("em_quarter_ss8"),
            DependencyRule::new("em_quarter_ss8", "em_real8"),
            DependencyRule::new("wrfda_4dvar", "wrfplus"),
        ])
    }

    /// Canonical table with `extra` rules evaluated first.
    pub fn canonical_with(extra: &[DependencyRule]) -> Self {
        let mut rules = extra.to_vec();
        rules.extend(Self::canonical().rules);
        Self::new(rules)
    }
}

impl DependencyResolver for DependencyTable {
    fn resolve(&self, variant: &str) -> Option<String> {
        self.rules
            .iter()
            .find(|rule| rule.matches(variant))
            .map(|rule| rule.depends_on.clone())
    }
}
