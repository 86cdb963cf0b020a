//! Plan file schema.
//!
//! A plan declares the steps a host may run:
//!
//! ```toml
//! [defaults]
//! strategy = "pip"
//! timeout_secs = 600
//!
//! [[step]]
//! name = "mask-sleep-targets"
//! category = "power"
//! severity = "warn"
//! platforms = ["linux"]
//! requires_elevation = true
//! apply = { kind = "command", check = ["..."], run = [["..."]] }
//! revert = { kind = "command", run = [["..."]] }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::{Category, OsFamily, Severity};

/// Root of a plan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default)]
    pub defaults: PlanDefaults,

    /// Declared steps, in declaration order.
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

/// Run defaults a plan may carry; command-line flags override them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanDefaults {
    /// Installation strategy used when none is given on the command line
    #[serde(default)]
    pub strategy: Option<String>,

    /// Per-action timeout in seconds for steps that declare none
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Categories skipped unless re-enabled
    #[serde(default)]
    pub skip: Vec<Category>,
}

/// One declared step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub category: Category,

    #[serde(default)]
    pub severity: Severity,

    /// OS families the step applies to; empty means all known families
    #[serde(default)]
    pub platforms: Vec<OsFamily>,

    /// Installation strategies the step belongs to; empty means all
    #[serde(default)]
    pub strategies: Vec<String>,

    #[serde(default)]
    pub requires_elevation: bool,

    /// Only select the step when a discrete accelerator is present
    #[serde(default)]
    pub requires_accelerator: bool,

    /// Ordering hint within the category; lower runs first
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    pub apply: ActionSpec,

    #[serde(default)]
    pub revert: Option<ActionSpec>,
}

/// How an action is carried out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ActionSpec {
    /// External commands with an optional check and ordered fallbacks
    Command(CommandSpec),
    /// Persisted environment variable in the managed env file
    EnvVar(EnvVarSpec),
    /// Generated file under the artifact directory
    File(FileSpec),
    /// Revert only: undo an `env-var` or `file` apply action
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Exits zero when the desired state is already in place
    #[serde(default)]
    pub check: Option<Vec<String>>,

    /// Alternatives tried in order until one exits zero
    pub run: Vec<Vec<String>>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarSpec {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path relative to the artifact directory
    pub path: String,
    pub contents: String,
    #[serde(default)]
    pub executable: bool,
}

impl PlanFile {
    /// Validate the plan after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(strategy) = &self.defaults.strategy
            && strategy.trim().is_empty()
        {
            anyhow::bail!("Default strategy must not be empty");
        }
        if self.defaults.timeout_secs == Some(0) {
            anyhow::bail!("Default timeout_secs must be greater than zero");
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                anyhow::bail!("Duplicate step name: '{}'", step.name);
            }
            step.validate()
                .with_context(|| format!("Invalid step: '{}'", step.name))?;
        }
        Ok(())
    }
}

impl StepSpec {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Step name must not be empty");
        }
        if self.name.chars().any(|c| c.is_whitespace()) {
            anyhow::bail!("Step name must not contain whitespace");
        }
        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be greater than zero");
        }
        if self.platforms.contains(&OsFamily::Unknown) {
            anyhow::bail!("'unknown' is not a valid platform restriction");
        }

        if self.apply == ActionSpec::Inverse {
            anyhow::bail!("apply action cannot be 'inverse'");
        }
        self.apply.validate().context("Invalid apply action")?;

        if let Some(revert) = &self.revert {
            if *revert == ActionSpec::Inverse
                && !matches!(self.apply, ActionSpec::EnvVar(_) | ActionSpec::File(_))
            {
                anyhow::bail!("'inverse' revert requires an 'env-var' or 'file' apply action");
            }
            revert.validate().context("Invalid revert action")?;
        }
        Ok(())
    }
}

impl ActionSpec {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            ActionSpec::Command(spec) => {
                if spec.run.is_empty() {
                    anyhow::bail!("command action needs at least one 'run' entry");
                }
                if spec.run.iter().any(|argv| argv.is_empty()) {
                    anyhow::bail!("'run' entries must not be empty");
                }
                if spec.check.as_ref().is_some_and(|argv| argv.is_empty()) {
                    anyhow::bail!("'check' must not be empty");
                }
            }
            ActionSpec::EnvVar(spec) => {
                if !is_valid_env_name(&spec.name) {
                    anyhow::bail!("Invalid environment variable name: '{}'", spec.name);
                }
            }
            ActionSpec::File(spec) => validate_artifact_path(Path::new(&spec.path))?,
            ActionSpec::Inverse => {}
        }
        Ok(())
    }
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn validate_artifact_path(path: &Path) -> anyhow::Result<()> {
    if path.as_os_str().is_empty() {
        anyhow::bail!("Artifact path must not be empty");
    }
    for component in path.components() {
        match component {
            Component::ParentDir => anyhow::bail!("Path traversal is not allowed in artifact paths"),
            Component::Prefix(_) | Component::RootDir => {
                anyhow::bail!("Absolute paths are not allowed in artifact paths")
            }
            _ => {}
        }
    }
    Ok(())
}
