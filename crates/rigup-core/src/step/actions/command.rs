//! External command actions with an optional "already done" check and fallbacks.

use std::collections::BTreeMap;

use crate::error::StepError;
use crate::process::Invocation;
use crate::step::{Action, ActionContext, ActionOutput, ActionResult};

/// Runs external commands.
///
/// When `check` exits zero the host is already in the desired state and the
/// action is a no-op. Otherwise each `run` alternative is tried in order and
/// the first one that exits zero wins.
#[derive(Debug, Clone)]
pub struct CommandAction {
    check: Option<Vec<String>>,
    run: Vec<Vec<String>>,
    env: BTreeMap<String, String>,
}

impl CommandAction {
    pub fn new(run: Vec<Vec<String>>) -> Self {
        Self {
            check: None,
            run,
            env: BTreeMap::new(),
        }
    }

    pub fn with_check(mut self, check: Vec<String>) -> Self {
        self.check = Some(check);
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn invocation(&self, argv: &[String], ctx: &ActionContext<'_>) -> Result<Invocation, StepError> {
        let expanded: Vec<String> = argv.iter().map(|arg| expand(arg, ctx)).collect();
        Ok(Invocation::from_argv(&expanded)?.with_env(&self.env))
    }

    /// `Ok(true)` when the check command reports the desired state.
    fn already_satisfied(&self, ctx: &ActionContext<'_>) -> Result<bool, StepError> {
        let Some(check) = &self.check else {
            return Ok(false);
        };
        let invocation = self.invocation(check, ctx)?;
        match invocation.output(ctx.timeout) {
            Ok(output) => Ok(output.success()),
            Err(e) if e.is_timeout() => Err(e),
            Err(e) => {
                tracing::debug!(check = %invocation.display(), error = %e, "Check command unavailable; treating as unsatisfied");
                Ok(false)
            }
        }
    }
}

impl Action for CommandAction {
    fn describe(&self) -> String {
        match self.run.first() {
            Some(first) if self.run.len() > 1 => {
                format!("run `{}` (+{} fallbacks)", first.join(" "), self.run.len() - 1)
            }
            Some(first) => format!("run `{}`", first.join(" ")),
            None => "no commands".to_string(),
        }
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        if self.already_satisfied(ctx)? {
            let check = self.check.as_deref().unwrap_or_default().join(" ");
            return Ok(ActionOutput::no_op(format!("check `{check}` passed")));
        }

        let mut last_error = None;
        for (index, argv) in self.run.iter().enumerate() {
            let invocation = self.invocation(argv, ctx)?;
            match invocation.run(ctx.timeout) {
                Ok(_) if index == 0 => {
                    return Ok(ActionOutput::changed(format!("ran `{}`", invocation.display())));
                }
                Ok(_) => {
                    return Ok(ActionOutput::changed(format!(
                        "ran `{}` (fallback {} of {})",
                        invocation.display(),
                        index,
                        self.run.len() - 1
                    )));
                }
                Err(e) => {
                    tracing::warn!(command = %invocation.display(), error = %e, "Command alternative failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(ActionOutput::no_op("nothing to run")),
        }
    }
}

/// Substitute run values into a command argument.
///
/// Recognized placeholders: `{artifact_dir}`, `{strategy}`, `{os}`, `{arch}`.
fn expand(arg: &str, ctx: &ActionContext<'_>) -> String {
    if !arg.contains('{') {
        return arg.to_string();
    }
    arg.replace("{artifact_dir}", &ctx.artifact_dir.to_string_lossy())
        .replace("{strategy}", ctx.strategy)
        .replace("{os}", ctx.env.os().as_str())
        .replace("{arch}", ctx.env.arch())
}
