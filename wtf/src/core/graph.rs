//! Structural checks on the variant dependency graph.
//!
//! Every variant has at most one prerequisite, so the graph is a forest of
//! chains. Checks run in declaration order and report the first violation.

use std::collections::{BTreeMap, HashSet};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("variant '{variant}' depends on itself")]
    SelfDependency { variant: String },
    #[error("variant '{variant}' depends on '{prerequisite}', which is not in the descriptor")]
    UnknownPrerequisite {
        variant: String,
        prerequisite: String,
    },
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },
}

/// Validate `(variant, prerequisite)` edges.
///
/// - no variant depends on itself
/// - every prerequisite is one of the listed variants
/// - following prerequisites never returns to a variant already on the chain
pub fn validate_edges(edges: &[(&str, Option<&str>)]) -> Result<(), GraphError> {
    let lookup: BTreeMap<&str, Option<&str>> = edges.iter().copied().collect();

    for (variant, prerequisite) in edges {
        let Some(prerequisite) = prerequisite else {
            continue;
        };
        if prerequisite == variant {
            return Err(GraphError::SelfDependency {
                variant: variant.to_string(),
            });
        }
        if !lookup.contains_key(prerequisite) {
            return Err(GraphError::UnknownPrerequisite {
                variant: variant.to_string(),
                prerequisite: prerequisite.to_string(),
            });
        }
    }

    for (variant, _) in edges {
        let mut chain = vec![*variant];
        let mut seen = HashSet::from([*variant]);
        let mut current = *variant;
        while let Some(&Some(next)) = lookup.get(current) {
            chain.push(next);
            if !seen.insert(next) {
                let start = chain.iter().position(|name| *name == next).unwrap_or(0);
                return Err(GraphError::Cycle {
                    cycle: chain[start..].iter().map(|name| name.to_string()).collect(),
                });
            }
            current = next;
        }
    }

    Ok(())
}

/// Longest prerequisite chain below any variant (0 when nothing depends on anything).
///
/// Only meaningful for edges that passed [`validate_edges`].
pub fn dependency_depth(edges: &[(&str, Option<&str>)]) -> usize {
    let lookup: BTreeMap<&str, Option<&str>> = edges.iter().copied().collect();
    edges
        .iter()
        .map(|(variant, _)| {
            let mut depth = 0;
            let mut current = *variant;
            while let Some(&Some(next)) = lookup.get(current) {
                depth += 1;
                current = next;
                if depth > edges.len() {
                    break;
                }
            }
            depth
        })
        .max()
        .unwrap_or(0)
}
