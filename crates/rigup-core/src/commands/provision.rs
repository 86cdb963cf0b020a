//! Apply, revert and preview commands.
//!
//! Loads the plan, detects the host, resolves the run configuration and
//! drives the orchestrator (or the revert engine) under the run lock.

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;

use crate::config::{LoadedPlan, RunConfiguration};
use crate::context::AppContext;
use crate::detect::{self, Environment};
use crate::executor::{Orchestrator, RunResult, StopSignal};
use crate::lock::RunLock;
use crate::registry::{Exclusion, StepCatalog, build_registry};
use crate::revert::RevertEngine;
use crate::step::StepDefinition;
use crate::transcript::Transcript;
use crate::types::{Category, Mode, Severity};

/// Caller choices for a run; unset values fall back to plan defaults.
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub mode: Mode,
    /// Explicit plan file
    pub plan: Option<PathBuf>,
    pub strategy: Option<String>,
    pub skip: Vec<Category>,
    pub skip_steps: Vec<String>,
    pub non_interactive: bool,
    pub artifact_dir: Option<PathBuf>,
    pub transcript: Option<PathBuf>,
}

impl ProvisionOptions {
    pub fn apply() -> Self {
        Self::default()
    }

    pub fn revert() -> Self {
        Self {
            mode: Mode::Revert,
            ..Self::default()
        }
    }

    pub fn with_plan(mut self, plan: impl Into<PathBuf>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn with_skip(mut self, category: Category) -> Self {
        self.skip.push(category);
        self
    }

    pub fn with_skip_step(mut self, name: impl Into<String>) -> Self {
        self.skip_steps.push(name.into());
        self
    }

    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    pub fn with_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript = Some(path.into());
        self
    }
}

/// One step as it would run.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewStep {
    pub name: String,
    pub category: Category,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExcludedStep {
    pub name: String,
    pub reason: Exclusion,
}

/// What a run would do, without doing it.
#[derive(Debug, Clone, Serialize)]
pub struct PlanPreview {
    pub mode: Mode,
    pub strategy: String,
    pub plan: String,
    pub environment: Environment,
    pub steps: Vec<PreviewStep>,
    /// Revert mode: selected steps that will be reported as skipped
    pub irreversible: Vec<String>,
    pub excluded: Vec<ExcludedStep>,
}

/// Result of an executed run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub plan: String,
    pub environment: Environment,
    pub transcript: PathBuf,
    #[serde(flatten)]
    pub result: RunResult,
}

#[derive(Debug)]
pub struct ProvisionCommand {
    ctx: AppContext,
    environment: Option<Environment>,
}

impl ProvisionCommand {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            environment: None,
        }
    }

    /// Create a command with default paths
    pub fn with_defaults() -> anyhow::Result<Self> {
        Ok(Self::new(AppContext::with_defaults()?))
    }

    /// Use `env` instead of probing the host.
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.environment = Some(env);
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn detect(&self) -> Environment {
        self.environment.clone().unwrap_or_else(detect::detect)
    }

    pub fn load_plan(&self, options: &ProvisionOptions) -> anyhow::Result<LoadedPlan> {
        self.ctx.plan_store(options.plan.as_deref()).load()
    }

    /// Resolve the run configuration: plan defaults first, then options.
    pub fn resolve_config(&self, options: &ProvisionOptions, plan: &LoadedPlan) -> RunConfiguration {
        let artifact_dir = options
            .artifact_dir
            .clone()
            .unwrap_or_else(|| self.ctx.artifact_dir().to_path_buf());
        let transcript = options
            .transcript
            .clone()
            .unwrap_or_else(|| self.ctx.transcript_path());

        let mut cfg = RunConfiguration::new(options.mode, artifact_dir, transcript)
            .with_plan_defaults(&plan.plan.defaults)
            .with_skip(options.skip.iter().copied())
            .with_skip_steps(options.skip_steps.iter().cloned())
            .with_non_interactive(options.non_interactive);
        if let Some(strategy) = &options.strategy {
            cfg = cfg.with_strategy(strategy);
        }
        cfg
    }

    /// Show what a run with `options` would execute.
    pub fn preview(&self, options: &ProvisionOptions) -> anyhow::Result<PlanPreview> {
        let loaded = self.load_plan(options)?;
        let catalog = StepCatalog::from_plan(&loaded.plan)?;
        let env = self.detect();
        let cfg = self.resolve_config(options, &loaded);
        let registry = build_registry(&catalog, &env, &cfg);

        Ok(PlanPreview {
            mode: cfg.mode(),
            strategy: cfg.strategy().to_string(),
            plan: loaded.source.to_string(),
            steps: registry
                .steps()
                .iter()
                .map(|step| PreviewStep {
                    name: step.name().to_string(),
                    category: step.category(),
                    severity: step.severity(),
                    description: step.description().map(str::to_string),
                    action: match cfg.mode() {
                        Mode::Apply => step.apply_action().describe(),
                        Mode::Revert => step
                            .revert_action()
                            .map(|a| a.describe())
                            .unwrap_or_default(),
                    },
                })
                .collect(),
            irreversible: names(registry.irreversible()),
            excluded: registry
                .excluded()
                .iter()
                .map(|(step, reason)| ExcludedStep {
                    name: step.name().to_string(),
                    reason: *reason,
                })
                .collect(),
            environment: env,
        })
    }

    /// Run the plan in the direction `options.mode` asks for.
    ///
    /// Holds the run lock for the whole run. Fails only when the plan cannot
    /// be loaded, the lock is held or the transcript cannot be written; step
    /// failures are in the returned report.
    pub fn execute(&self, options: &ProvisionOptions, stop: StopSignal) -> anyhow::Result<ProvisionReport> {
        let loaded = self.load_plan(options)?;
        let catalog = StepCatalog::from_plan(&loaded.plan)?;
        let env = self.detect();
        let cfg = self.resolve_config(options, &loaded);

        let _lock = RunLock::acquire(self.ctx.lock_path())?;
        let mut transcript = Transcript::open(cfg.transcript_path())?;

        tracing::info!(
            mode = %cfg.mode(),
            plan = %loaded.source,
            transcript = %cfg.transcript_path().display(),
            "Provisioning"
        );

        let result = match cfg.mode() {
            Mode::Apply => {
                let registry = build_registry(&catalog, &env, &cfg);
                Orchestrator::new(&env, &cfg, &mut transcript)
                    .with_stop_signal(stop)
                    .with_plan_digest(&loaded.digest)
                    .run(&registry)
            }
            Mode::Revert => RevertEngine::new(&catalog, &env, &cfg).run(
                &mut transcript,
                stop,
                Some(&loaded.digest),
            ),
        }
        .context("Transcript could not be written; run stopped")?;

        Ok(ProvisionReport {
            plan: loaded.source.to_string(),
            environment: env,
            transcript: cfg.transcript_path().to_path_buf(),
            result,
        })
    }
}

fn names(steps: &[&StepDefinition]) -> Vec<String> {
    steps.iter().map(|s| s.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Accelerator;
    use crate::types::OsFamily;
    use tempfile::TempDir;

    const PLAN: &str = r#"
[defaults]
strategy = "conda"

[[step]]
name = "hf-home"
category = "env-var"
apply = { kind = "env-var", name = "HF_HOME", value = "/data/hf" }
revert = { kind = "inverse" }

[[step]]
name = "pip-only"
category = "package"
strategies = ["pip"]
apply = { kind = "command", run = [["true"]] }
"#;

    fn command(temp: &TempDir) -> ProvisionCommand {
        let ctx = AppContext::under(temp.path());
        std::fs::create_dir_all(ctx.config_dir()).unwrap();
        std::fs::write(ctx.plan_path(), PLAN).unwrap();
        ProvisionCommand::new(ctx).with_environment(Environment::new(
            OsFamily::Linux,
            "x86_64",
            Accelerator::None,
            false,
        ))
    }

    #[test]
    fn options_override_plan_defaults() {
        let temp = TempDir::new().unwrap();
        let cmd = command(&temp);
        let options = ProvisionOptions::apply().with_strategy("pip");
        let loaded = cmd.load_plan(&options).unwrap();
        let cfg = cmd.resolve_config(&options, &loaded);
        assert_eq!(cfg.strategy(), "pip");
        assert_eq!(cfg.artifact_dir(), temp.path().join("artifacts"));

        let cfg = cmd.resolve_config(&ProvisionOptions::apply(), &loaded);
        assert_eq!(cfg.strategy(), "conda");
    }

    #[test]
    fn preview_lists_selection_and_exclusions() {
        let temp = TempDir::new().unwrap();
        let preview = command(&temp).preview(&ProvisionOptions::apply()).unwrap();

        assert_eq!(preview.steps.len(), 1);
        assert_eq!(preview.steps[0].name, "hf-home");
        assert_eq!(preview.steps[0].action, "persist HF_HOME=/data/hf");
        assert_eq!(preview.excluded.len(), 1);
        assert_eq!(preview.excluded[0].reason, Exclusion::OtherStrategy);
        // preview never writes the transcript
        assert!(!temp.path().join("state").join("transcript.log").exists());
    }

    #[test]
    fn execute_writes_transcript_and_releases_lock() {
        let temp = TempDir::new().unwrap();
        let cmd = command(&temp);
        let report = cmd
            .execute(&ProvisionOptions::apply(), StopSignal::new())
            .unwrap();

        assert_eq!(report.result.outcomes.len(), 1);
        assert!(report.transcript.exists());
        assert!(!cmd.context().lock_path().exists());
    }

    #[test]
    fn missing_explicit_plan_fails() {
        let temp = TempDir::new().unwrap();
        let cmd = command(&temp);
        let options = ProvisionOptions::apply().with_plan(temp.path().join("missing.toml"));
        assert!(cmd.execute(&options, StopSignal::new()).is_err());
    }
}
