//! Plan store for locating and loading plan files.

use std::path::{Path, PathBuf};

use super::{PlanFile, parser};

/// Example plan shipped with the binary.
pub const BUILTIN_PLAN: &str = include_str!("../../plans/workstation.toml");

/// Where a loaded plan came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSource {
    File(PathBuf),
    Builtin,
}

impl std::fmt::Display for PlanSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanSource::File(path) => write!(f, "{}", path.display()),
            PlanSource::Builtin => f.write_str("<builtin>"),
        }
    }
}

/// A parsed, validated plan with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedPlan {
    pub plan: PlanFile,
    pub source: PlanSource,
    /// Short blake3 digest of the plan text
    pub digest: String,
}

#[derive(Debug, Clone)]
pub struct PlanStore {
    plan_path: PathBuf,
    builtin_fallback: bool,
}

impl PlanStore {
    /// Plan at an explicit path; a missing file is an error.
    pub fn from_path(plan_path: impl Into<PathBuf>) -> Self {
        Self {
            plan_path: plan_path.into(),
            builtin_fallback: false,
        }
    }

    /// Plan at a default location; falls back to the built-in plan when absent.
    pub fn with_builtin_fallback(plan_path: impl Into<PathBuf>) -> Self {
        Self {
            plan_path: plan_path.into(),
            builtin_fallback: true,
        }
    }

    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    pub fn load(&self) -> anyhow::Result<LoadedPlan> {
        if !self.plan_path.exists() {
            if self.builtin_fallback {
                tracing::debug!(path = %self.plan_path.display(), "No plan file; using built-in plan");
                return Self::builtin();
            }
            anyhow::bail!("Plan file not found: {}", self.plan_path.display());
        }

        let content = std::fs::read_to_string(&self.plan_path).map_err(|e| {
            anyhow::anyhow!("Failed to read plan file {}: {}", self.plan_path.display(), e)
        })?;
        let plan = parser::parse_plan_str(&content).map_err(|e| {
            e.context(format!(
                "Failed to parse plan file: {}",
                self.plan_path.display()
            ))
        })?;
        Ok(LoadedPlan {
            plan,
            source: PlanSource::File(self.plan_path.clone()),
            digest: parser::plan_digest(&content),
        })
    }

    pub fn builtin() -> anyhow::Result<LoadedPlan> {
        let plan = parser::parse_plan_str(BUILTIN_PLAN)
            .map_err(|e| e.context("Built-in plan is invalid"))?;
        Ok(LoadedPlan {
            plan,
            source: PlanSource::Builtin,
            digest: parser::plan_digest(BUILTIN_PLAN),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_plan_parses() {
        let loaded = PlanStore::builtin().unwrap();
        assert_eq!(loaded.source, PlanSource::Builtin);
        assert!(!loaded.plan.steps.is_empty());
        assert_eq!(loaded.plan.defaults.strategy.as_deref(), Some("pip"));
    }

    #[test]
    fn missing_explicit_plan_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = PlanStore::from_path(temp.path().join("nope.toml"));
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("Plan file not found"));
    }

    #[test]
    fn missing_default_plan_falls_back() {
        let temp = tempfile::TempDir::new().unwrap();
        let store = PlanStore::with_builtin_fallback(temp.path().join("plan.toml"));
        assert_eq!(store.load().unwrap().source, PlanSource::Builtin);
    }

    #[test]
    fn plan_file_is_loaded_with_digest() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("plan.toml");
        std::fs::write(&path, "[defaults]\nstrategy = \"conda\"\n").unwrap();

        let loaded = PlanStore::with_builtin_fallback(&path).load().unwrap();
        assert_eq!(loaded.source, PlanSource::File(path));
        assert_eq!(loaded.plan.defaults.strategy.as_deref(), Some("conda"));
        assert_eq!(loaded.digest.len(), 16);
    }
}
