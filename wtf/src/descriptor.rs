//! Test descriptor (`*.wtf`) files.
//!
//! A descriptor is a list of shell-style assignments, one per line:
//!
//! ```text
//! # gfortran on the build box
//! export COMPILER=gnu
//! BUILD_TYPES="em_real em_b_wave em_chem"
//! CONFIGURE_SERIAL=32
//! CONFIGURE_MPI=34
//! BUILD_OPTIONS_em_chem="-d"
//! NUM_PROC_BUILD=8
//! TARFILE_DIR=$HOME/tarballs
//! ```
//!
//! Lines that are not assignments are ignored. Unrecognized names become
//! auxiliary parameters that are passed through to the collaborator scripts.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::variant::VariantDecl;
use crate::error::WtfError;

pub const DESCRIPTOR_EXTENSION: &str = "wtf";

const COMPILER_KEY: &str = "COMPILER";
const VARIANTS_KEY: &str = "BUILD_TYPES";
/// Global configure tokens, concatenated in this order.
const CONFIGURE_KEYS: [&str; 3] = ["CONFIGURE_SERIAL", "CONFIGURE_OPENMP", "CONFIGURE_MPI"];
const VARIANT_OPTIONS_PREFIX: &str = "BUILD_OPTIONS_";

pub const PARAM_NUM_PROC_BUILD: &str = "NUM_PROC_BUILD";
pub const PARAM_TARFILE_DIR: &str = "TARFILE_DIR";

static ASSIGNMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)=(.*)$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("COMPILER is missing or empty")]
    MissingCompiler,
    #[error("BUILD_TYPES lists no build variants")]
    NoVariants,
    #[error("build variant '{0}' is listed more than once")]
    DuplicateVariant(String),
    #[error("BUILD_OPTIONS_{0} names a variant not in BUILD_TYPES")]
    UnknownVariantOptions(String),
}

/// Parsed test descriptor for one machine/compiler combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestDescriptor {
    pub compiler: String,
    /// Declaration order, not execution order.
    pub variants: Vec<VariantDecl>,
    /// Global configure tokens applied to every variant.
    pub configure_options: Vec<String>,
    /// Everything else, for the collaborator scripts.
    pub parameters: BTreeMap<String, String>,
}

impl TestDescriptor {
    /// Read and parse a descriptor file.
    ///
    /// The path must end in `.wtf` and exist; both are usage errors.
    pub fn load(path: &Path) -> Result<Self> {
        if path.extension().and_then(|ext| ext.to_str()) != Some(DESCRIPTOR_EXTENSION) {
            return Err(WtfError::Usage(format!(
                "test files must end in '.{DESCRIPTOR_EXTENSION}': {}",
                path.display()
            ))
            .into());
        }
        if !path.is_file() {
            return Err(
                WtfError::Usage(format!("test file {} does not exist", path.display())).into(),
            );
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let descriptor = Self::parse(&contents).map_err(|err| WtfError::Descriptor {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        info!(
            path = %path.display(),
            compiler = %descriptor.compiler,
            variants = descriptor.variants.len(),
            "loaded test descriptor"
        );
        Ok(descriptor)
    }

    pub fn parse(contents: &str) -> Result<Self, DescriptorError> {
        let mut vars: BTreeMap<String, String> = BTreeMap::new();
        for line in contents.lines() {
            let Some(caps) = ASSIGNMENT_RE.captures(line) else {
                continue;
            };
            let key = caps[1].to_string();
            let value = parse_value(&caps[2], &vars);
            debug!(%key, %value, "descriptor assignment");
            vars.insert(key, value);
        }

        let compiler = vars
            .remove(COMPILER_KEY)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(DescriptorError::MissingCompiler)?;

        let names: Vec<String> = vars
            .remove(VARIANTS_KEY)
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Err(DescriptorError::NoVariants);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = names.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(DescriptorError::DuplicateVariant(dup.clone()));
        }

        let mut configure_options = Vec::new();
        for key in CONFIGURE_KEYS {
            if let Some(value) = vars.remove(key) {
                configure_options.extend(value.split_whitespace().map(str::to_string));
            }
        }

        let mut variants: Vec<VariantDecl> =
            names.iter().map(|name| VariantDecl::new(name)).collect();
        let option_keys: Vec<String> = vars
            .keys()
            .filter(|key| key.starts_with(VARIANT_OPTIONS_PREFIX))
            .cloned()
            .collect();
        for key in option_keys {
            let variant_name = &key[VARIANT_OPTIONS_PREFIX.len()..];
            let decl = variants
                .iter_mut()
                .find(|decl| decl.name == variant_name)
                .ok_or_else(|| DescriptorError::UnknownVariantOptions(variant_name.to_string()))?;
            if let Some(value) = vars.remove(&key) {
                decl.configure_options = value.split_whitespace().map(str::to_string).collect();
            }
        }

        Ok(Self {
            compiler,
            variants,
            configure_options,
            parameters: vars,
        })
    }

    pub fn variant_names(&self) -> Vec<&str> {
        self.variants.iter().map(|decl| decl.name.as_str()).collect()
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Working area override (`TARFILE_DIR`).
    pub fn tarfile_dir(&self) -> Option<PathBuf> {
        self.parameter(PARAM_TARFILE_DIR)
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Parallel build jobs (`NUM_PROC_BUILD`); unparsable values are ignored.
    pub fn num_proc_build(&self) -> Option<u32> {
        let raw = self.parameter(PARAM_NUM_PROC_BUILD)?;
        match raw.trim().parse() {
            Ok(count) => Some(count),
            Err(_) => {
                warn!(value = raw, "ignoring non-numeric {PARAM_NUM_PROC_BUILD}");
                None
            }
        }
    }
}

/// Interpret the right-hand side of an assignment the way a shell would for
/// the simple cases descriptors use: quotes, backslash escapes, trailing
/// comments, and `$NAME`/`${NAME}` references to earlier assignments.
fn parse_value(raw: &str, vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut chars = raw.chars().peekable();
    let mut quote: Option<char> = None;
    let mut word_start = false;
    // Length of `out` excluding trailing unquoted whitespace.
    let mut keep = 0;

    while let Some(c) = chars.next() {
        match (quote, c) {
            (None, '#') if word_start => break,
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), c) if c == open => quote = None,
            (Some('\''), c) => out.push(c),
            (Some(_), '\\') => match chars.next() {
                Some(next @ ('$' | '`' | '"' | '\\')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            (None, '\\') => out.push(chars.next().unwrap_or('\\')),
            (_, '$') => expand_variable(&mut chars, vars, &mut out),
            (_, c) => out.push(c),
        }
        if quote.is_some() || !c.is_whitespace() {
            keep = out.len();
        }
        word_start = quote.is_none() && c.is_whitespace();
    }

    out.truncate(keep);
    out
}

fn expand_variable(
    chars: &mut Peekable<Chars<'_>>,
    vars: &BTreeMap<String, String>,
    out: &mut String,
) {
    if chars.peek() == Some(&'{') {
        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }
        match vars.get(&name) {
            Some(value) if closed => out.push_str(value),
            _ => {
                out.push_str("${");
                out.push_str(&name);
                if closed {
                    out.push('}');
                }
            }
        }
        return;
    }

    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        let valid = c == '_' || c.is_ascii_alphabetic() || (!name.is_empty() && c.is_ascii_digit());
        if !valid {
            break;
        }
        name.push(c);
        chars.next();
    }
    if name.is_empty() {
        out.push('$');
        return;
    }
    match vars.get(&name) {
        Some(value) => out.push_str(value),
        None => {
            out.push('$');
            out.push_str(&name);
        }
    }
}
