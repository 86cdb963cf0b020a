//! Step outcomes and aggregated run results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Mode, RunStatus, StepStatus};

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub status: StepStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl StepOutcome {
    pub fn new(step: impl Into<String>, status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
pub enum AbortReason {
    /// A fatal step failed.
    FatalStep { step: String },
    /// A stop was requested; `before` is the first step that did not start.
    Cancelled { before: String },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::FatalStep { step } => write!(f, "fatal failure in step '{step}'"),
            AbortReason::Cancelled { before } => write!(f, "cancelled before step '{before}'"),
        }
    }
}

/// Outcome counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub warned: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded={} warned={} failed={} skipped={}",
            self.succeeded, self.warned, self.failed, self.skipped
        )
    }
}

/// Everything one orchestrator run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub mode: Mode,
    pub status: RunStatus,
    pub outcomes: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl RunResult {
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                StepStatus::Succeeded => summary.succeeded += 1,
                StepStatus::Warned => summary.warned += 1,
                StepStatus::FailedFatal => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// The step that aborted the run, if one did.
    pub fn first_fatal(&self) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.status == StepStatus::FailedFatal)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Warned)
    }

    /// True when no step was selected at all.
    pub fn nothing_to_do(&self) -> bool {
        self.outcomes.is_empty() && self.abort.is_none()
    }
}

/// Overall status from the outcomes, given whether the run was cut short.
pub(crate) fn overall_status(outcomes: &[StepOutcome], aborted: bool) -> RunStatus {
    if aborted {
        RunStatus::Aborted
    } else if outcomes.iter().any(|o| o.status == StepStatus::Warned) {
        RunStatus::CompletedWithWarnings
    } else {
        RunStatus::Completed
    }
}
