//! Application context shared by frontends.

use std::path::{Path, PathBuf};

use crate::config::{PlanStore, paths};

/// Locations a run reads from and writes to.
///
/// Frontends create this once (usually with [`AppContext::with_defaults`])
/// and pass it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    config_dir: PathBuf,
    state_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl AppContext {
    /// Create a new context with explicit paths.
    pub fn new(config_dir: PathBuf, state_dir: PathBuf, artifact_dir: PathBuf) -> Self {
        Self {
            config_dir,
            state_dir,
            artifact_dir,
        }
    }

    /// Context rooted at the platform's per-user directories.
    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::new(
            paths::default_config_dir()?,
            paths::default_state_dir()?,
            paths::default_artifact_dir()?,
        ))
    }

    /// Context with everything under one directory (for testing).
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("config"),
            root.join("state"),
            root.join("artifacts"),
        )
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn plan_path(&self) -> PathBuf {
        paths::plan_path(&self.config_dir)
    }

    pub fn transcript_path(&self) -> PathBuf {
        paths::transcript_path(&self.state_dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        paths::lock_path(&self.state_dir)
    }

    /// Plan store for an explicit plan file, or the default one with built-in fallback.
    pub fn plan_store(&self, explicit: Option<&Path>) -> PlanStore {
        match explicit {
            Some(path) => PlanStore::from_path(path),
            None => PlanStore::with_builtin_fallback(self.plan_path()),
        }
    }
}
