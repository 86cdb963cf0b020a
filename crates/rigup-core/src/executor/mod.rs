//! Sequential step execution with per-step failure policy.
//!
//! The [`Orchestrator`] walks a [`StepRegistry`] in order, runs the apply or
//! revert action of each step and classifies failures by the step's
//! [`Severity`]. Action failures (including panics) become outcomes; only a
//! transcript write failure is returned as an error.

mod outcome;
mod stop;

pub use outcome::{AbortReason, RunResult, RunSummary, StepOutcome};
pub use stop::StopSignal;

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::config::RunConfiguration;
use crate::detect::Environment;
use crate::error::{StepError, TranscriptError};
use crate::registry::StepRegistry;
use crate::step::{ActionContext, StepDefinition};
use crate::transcript::{TranscriptRecord, TranscriptSink};
use crate::types::{Mode, Severity, StepStatus};

/// Message for steps that have nothing to undo.
pub const NO_REVERT_MESSAGE: &str = "no revert action defined";

pub struct Orchestrator<'a> {
    env: &'a Environment,
    cfg: &'a RunConfiguration,
    transcript: &'a mut dyn TranscriptSink,
    stop: StopSignal,
    plan_digest: Option<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        env: &'a Environment,
        cfg: &'a RunConfiguration,
        transcript: &'a mut dyn TranscriptSink,
    ) -> Self {
        Self {
            env,
            cfg,
            transcript,
            stop: StopSignal::new(),
            plan_digest: None,
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Fingerprint written into the run-start record.
    pub fn with_plan_digest(mut self, digest: impl Into<String>) -> Self {
        self.plan_digest = Some(digest.into());
        self
    }

    /// Run every step of `registry` in its direction.
    pub fn run(&mut self, registry: &StepRegistry<'_>) -> Result<RunResult, TranscriptError> {
        let mode = registry.mode();
        let header = self.header(registry);
        self.transcript.append(&TranscriptRecord::run_start(header))?;

        if registry.is_empty() {
            tracing::info!(%mode, env = %self.env, "No steps selected; nothing to do");
        } else {
            tracing::info!(%mode, steps = registry.len(), "Starting run");
        }

        let mut outcomes = Vec::new();
        let mut abort = None;

        // Irreversible steps are reported up front so they show in every revert run.
        for step in registry.irreversible() {
            let outcome = StepOutcome::new(step.name(), StepStatus::Skipped, NO_REVERT_MESSAGE);
            tracing::debug!(step = step.name(), "No revert action");
            self.transcript.record(&outcome)?;
            outcomes.push(outcome);
        }

        for step in registry.steps() {
            if self.stop.is_raised() {
                tracing::warn!(step = step.name(), "Stop requested; not starting further steps");
                abort = Some(AbortReason::Cancelled {
                    before: step.name().to_string(),
                });
                break;
            }

            let outcome = self.execute_step(step, mode);
            self.transcript.record(&outcome)?;
            let fatal = outcome.status == StepStatus::FailedFatal;
            outcomes.push(outcome);

            if fatal {
                abort = Some(AbortReason::FatalStep {
                    step: step.name().to_string(),
                });
                break;
            }
        }

        let status = outcome::overall_status(&outcomes, abort.is_some());
        let result = RunResult {
            mode,
            status,
            outcomes,
            abort,
        };

        let mut footer = format!("{} {}", result.status, result.summary());
        if let Some(reason) = &result.abort {
            footer.push_str(&format!(" ({reason})"));
        }
        self.transcript.append(&TranscriptRecord::run_end(footer))?;

        tracing::info!(%mode, status = %result.status, summary = %result.summary(), "Run finished");
        Ok(result)
    }

    fn header(&self, registry: &StepRegistry<'_>) -> String {
        let mut header = format!(
            "mode={} strategy={} os={} arch={} accelerator={} steps={}",
            registry.mode(),
            self.cfg.strategy(),
            self.env.os(),
            self.env.arch(),
            self.env.accelerator(),
            registry.len()
        );
        if let Some(digest) = &self.plan_digest {
            header.push_str(&format!(" plan={digest}"));
        }
        header
    }

    fn execute_step(&self, step: &StepDefinition, mode: Mode) -> StepOutcome {
        let action = match mode {
            Mode::Apply => step.apply_action(),
            Mode::Revert => match step.revert_action() {
                Some(action) => action,
                None => {
                    return StepOutcome::new(step.name(), StepStatus::Skipped, NO_REVERT_MESSAGE);
                }
            },
        };

        tracing::debug!(step = step.name(), %mode, action = %action.describe(), "Running step");

        let result = if step.requires_elevation() && !self.env.elevated() {
            Err(StepError::PreconditionUnmet(
                "requires administrator privileges".to_string(),
            ))
        } else {
            let ctx = ActionContext {
                env: self.env,
                artifact_dir: self.cfg.artifact_dir(),
                strategy: self.cfg.strategy(),
                timeout: step.timeout().unwrap_or(self.cfg.default_timeout()),
                non_interactive: self.cfg.non_interactive(),
            };
            catch_unwind(AssertUnwindSafe(|| action.execute(&ctx)))
                .unwrap_or_else(|payload| Err(StepError::failed(panic_message(payload.as_ref()))))
        };

        match result {
            Ok(output) => StepOutcome::new(step.name(), StepStatus::Succeeded, output.message),
            Err(err) => {
                let message = err.to_string();
                match step.severity() {
                    Severity::WarnAndContinue => {
                        tracing::warn!(step = step.name(), error = %message, "Step failed; continuing");
                        StepOutcome::new(step.name(), StepStatus::Warned, message)
                    }
                    Severity::Fatal => {
                        tracing::error!(step = step.name(), error = %message, "Fatal step failed; aborting run");
                        StepOutcome::new(step.name(), StepStatus::FailedFatal, message)
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("action panicked: {detail}")
}
