//! Resolved settings for a single run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::PlanDefaults;
use crate::step::DEFAULT_STEP_TIMEOUT;
use crate::types::{Category, Mode};

/// Installation strategy used when neither the plan nor the caller picks one.
pub const DEFAULT_STRATEGY: &str = "pip";

/// Immutable inputs to one apply or revert run.
///
/// Built from the plan's `[defaults]` first, then narrowed by caller
/// overrides through the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    mode: Mode,
    strategy: String,
    skip: BTreeSet<Category>,
    skip_steps: BTreeSet<String>,
    non_interactive: bool,
    artifact_dir: PathBuf,
    transcript_path: PathBuf,
    default_timeout: Duration,
}

impl RunConfiguration {
    pub fn new(mode: Mode, artifact_dir: impl Into<PathBuf>, transcript_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            strategy: DEFAULT_STRATEGY.to_string(),
            skip: BTreeSet::new(),
            skip_steps: BTreeSet::new(),
            non_interactive: false,
            artifact_dir: artifact_dir.into(),
            transcript_path: transcript_path.into(),
            default_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Seed strategy, timeout and skipped categories from plan defaults.
    pub fn with_plan_defaults(mut self, defaults: &PlanDefaults) -> Self {
        if let Some(strategy) = &defaults.strategy {
            self.strategy = strategy.clone();
        }
        if let Some(secs) = defaults.timeout_secs {
            self.default_timeout = Duration::from_secs(secs);
        }
        self.skip.extend(defaults.skip.iter().copied());
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    pub fn with_skip(mut self, categories: impl IntoIterator<Item = Category>) -> Self {
        self.skip.extend(categories);
        self
    }

    pub fn with_skip_steps<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_steps.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    pub fn skipped_categories(&self) -> &BTreeSet<Category> {
        &self.skip
    }

    pub fn skips_category(&self, category: Category) -> bool {
        self.skip.contains(&category)
    }

    pub fn skips_step(&self, name: &str) -> bool {
        self.skip_steps.contains(name)
    }

    pub fn non_interactive(&self) -> bool {
        self.non_interactive
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_plan_defaults() {
        let defaults = PlanDefaults {
            strategy: Some("conda".to_string()),
            timeout_secs: Some(30),
            skip: vec![Category::Power],
        };
        let cfg = RunConfiguration::new(Mode::Apply, "/tmp/a", "/tmp/t.log")
            .with_plan_defaults(&defaults)
            .with_strategy("pip")
            .with_skip([Category::Filesystem]);

        assert_eq!(cfg.strategy(), "pip");
        assert_eq!(cfg.default_timeout(), Duration::from_secs(30));
        assert!(cfg.skips_category(Category::Power));
        assert!(cfg.skips_category(Category::Filesystem));
        assert!(!cfg.skips_category(Category::Package));
    }

    #[test]
    fn defaults_without_plan() {
        let cfg = RunConfiguration::new(Mode::Revert, "/a", "/t");
        assert_eq!(cfg.mode(), Mode::Revert);
        assert_eq!(cfg.strategy(), DEFAULT_STRATEGY);
        assert_eq!(cfg.default_timeout(), DEFAULT_STEP_TIMEOUT);
        assert!(!cfg.non_interactive());
        assert!(!cfg.skips_step("anything"));
    }

    #[test]
    fn skipped_steps_by_name() {
        let cfg = RunConfiguration::new(Mode::Apply, "/a", "/t").with_skip_steps(["pip-torch"]);
        assert!(cfg.skips_step("pip-torch"));
        assert!(!cfg.skips_step("conda-torch"));
    }
}
