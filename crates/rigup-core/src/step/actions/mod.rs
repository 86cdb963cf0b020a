//! Built-in action kinds and construction from plan declarations.

pub mod artifact;
pub mod command;
pub mod env_var;

pub use artifact::FileArtifactAction;
pub use command::CommandAction;
pub use env_var::{ENV_FILE_NAME, EnvVarAction};

use crate::config::{ActionSpec, StepSpec};
use crate::step::{Action, StepDefinition};
use std::time::Duration;

/// Build an apply action from its declaration.
pub fn build_action(spec: &ActionSpec) -> anyhow::Result<Box<dyn Action>> {
    Ok(match spec {
        ActionSpec::Command(cmd) => {
            let mut action = CommandAction::new(cmd.run.clone()).with_env(cmd.env.clone());
            if let Some(check) = &cmd.check {
                action = action.with_check(check.clone());
            }
            Box::new(action)
        }
        ActionSpec::EnvVar(var) => Box::new(EnvVarAction::set(&var.name, &var.value)),
        ActionSpec::File(file) => Box::new(
            FileArtifactAction::write(&file.path, &file.contents).executable(file.executable),
        ),
        ActionSpec::Inverse => anyhow::bail!("'inverse' is only valid as a revert action"),
    })
}

/// Build a revert action, resolving `inverse` against the apply declaration.
pub fn build_revert(apply: &ActionSpec, revert: &ActionSpec) -> anyhow::Result<Box<dyn Action>> {
    match (revert, apply) {
        (ActionSpec::Inverse, ActionSpec::EnvVar(var)) => Ok(Box::new(EnvVarAction::unset(&var.name))),
        (ActionSpec::Inverse, ActionSpec::File(file)) => Ok(Box::new(
            FileArtifactAction::write(&file.path, &file.contents).inverse(),
        )),
        (ActionSpec::Inverse, _) => {
            anyhow::bail!("'inverse' revert requires an 'env-var' or 'file' apply action")
        }
        (other, _) => build_action(other),
    }
}

/// Turn a declared step into a runnable definition.
pub fn build_step(spec: &StepSpec) -> anyhow::Result<StepDefinition> {
    let apply = build_action(&spec.apply)?;
    let mut step = StepDefinition::new(&spec.name, spec.category, apply)
        .with_severity(spec.severity)
        .with_platforms(spec.platforms.iter().copied())
        .with_strategies(spec.strategies.iter().cloned())
        .with_requires_elevation(spec.requires_elevation)
        .with_requires_accelerator(spec.requires_accelerator)
        .with_priority(spec.priority);

    if let Some(description) = &spec.description {
        step = step.with_description(description);
    }
    if let Some(secs) = spec.timeout_secs {
        step = step.with_timeout(Duration::from_secs(secs));
    }
    if let Some(revert) = &spec.revert {
        step = step.with_revert(build_revert(&spec.apply, revert)?);
    }
    Ok(step)
}
