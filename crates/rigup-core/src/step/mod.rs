//! The step model: one idempotent unit of host modification with an optional inverse.
//!
//! A [`StepDefinition`] pairs an apply [`Action`] with an optional revert
//! action and tags the pair with a [`Category`] and a [`Severity`]. How an
//! action does its work is invisible to the orchestrator; it only sees an
//! [`ActionResult`].

pub mod actions;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::detect::Environment;
use crate::error::StepError;
use crate::types::{Category, OsFamily, Severity};

/// Default bound for a single action when the step declares none.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(600);

/// What an action sees of the run. Steps never read ambient process state.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub env: &'a Environment,
    pub artifact_dir: &'a Path,
    pub strategy: &'a str,
    pub timeout: Duration,
    pub non_interactive: bool,
}

/// Successful action result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutput {
    pub message: String,
    /// `false` when the host was already in the desired state.
    pub changed: bool,
}

impl ActionOutput {
    pub fn changed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            changed: true,
        }
    }

    pub fn no_op(message: impl Into<String>) -> Self {
        Self {
            message: format!("no-op: {}", message.into()),
            changed: false,
        }
    }
}

pub type ActionResult = Result<ActionOutput, StepError>;

/// One side (apply or revert) of a step.
///
/// Apply actions must be idempotent: when the host already matches the
/// desired state they return [`ActionOutput::no_op`] instead of redoing work.
pub trait Action: fmt::Debug + Send + Sync {
    /// Short description for previews and logs.
    fn describe(&self) -> String;

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult;
}

/// Action backed by a closure. Handy for embedding steps in code and for tests.
pub struct FnAction<F> {
    description: String,
    func: F,
}

impl<F> FnAction<F>
where
    F: Fn(&ActionContext<'_>) -> ActionResult + Send + Sync,
{
    pub fn new(description: impl Into<String>, func: F) -> Self {
        Self {
            description: description.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn(&ActionContext<'_>) -> ActionResult + Send + Sync,
{
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        (self.func)(ctx)
    }
}

/// A named, tagged apply/revert pair.
#[derive(Debug)]
pub struct StepDefinition {
    name: String,
    description: Option<String>,
    category: Category,
    severity: Severity,
    platforms: Vec<OsFamily>,
    strategies: Vec<String>,
    requires_elevation: bool,
    requires_accelerator: bool,
    priority: i32,
    timeout: Option<Duration>,
    apply: Box<dyn Action>,
    revert: Option<Box<dyn Action>>,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>, category: Category, apply: Box<dyn Action>) -> Self {
        Self {
            name: name.into(),
            description: None,
            category,
            severity: Severity::default(),
            platforms: Vec::new(),
            strategies: Vec::new(),
            requires_elevation: false,
            requires_accelerator: false,
            priority: 0,
            timeout: None,
            apply,
            revert: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn fatal(self) -> Self {
        self.with_severity(Severity::Fatal)
    }

    /// Restrict the step to the given OS families. No restriction means every
    /// known family.
    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = OsFamily>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    /// Restrict the step to the given installation strategies.
    pub fn with_strategies<I, S>(mut self, strategies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategies = strategies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requires_elevation(mut self, required: bool) -> Self {
        self.requires_elevation = required;
        self
    }

    pub fn with_requires_accelerator(mut self, required: bool) -> Self {
        self.requires_accelerator = required;
        self
    }

    /// Ordering hint within the step's category; lower runs first.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_revert(mut self, revert: Box<dyn Action>) -> Self {
        self.revert = Some(revert);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn platforms(&self) -> &[OsFamily] {
        &self.platforms
    }

    pub fn strategies(&self) -> &[String] {
        &self.strategies
    }

    pub fn requires_elevation(&self) -> bool {
        self.requires_elevation
    }

    pub fn requires_accelerator(&self) -> bool {
        self.requires_accelerator
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn apply_action(&self) -> &dyn Action {
        self.apply.as_ref()
    }

    pub fn revert_action(&self) -> Option<&dyn Action> {
        self.revert.as_deref()
    }

    pub fn is_revertible(&self) -> bool {
        self.revert.is_some()
    }

    /// Whether the step may run on the given OS family. Nothing runs on an
    /// unknown OS.
    pub fn supports_os(&self, os: OsFamily) -> bool {
        if os == OsFamily::Unknown {
            return false;
        }
        self.platforms.is_empty() || self.platforms.contains(&os)
    }

    pub fn supports_strategy(&self, strategy: &str) -> bool {
        self.strategies.is_empty() || self.strategies.iter().any(|s| s == strategy)
    }
}
