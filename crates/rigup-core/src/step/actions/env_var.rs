//! Persisted environment variables kept in a managed, shell-sourceable env file.

use std::path::{Path, PathBuf};

use crate::error::StepError;
use crate::step::{Action, ActionContext, ActionOutput, ActionResult};

/// Name of the env file inside the artifact directory.
pub const ENV_FILE_NAME: &str = "rigup.env";

/// Whether the action sets or removes the variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVarOp {
    Set,
    Unset,
}

/// Sets (or removes) one `export NAME='value'` line in the managed env file.
#[derive(Debug, Clone)]
pub struct EnvVarAction {
    name: String,
    value: String,
    op: EnvVarOp,
}

impl EnvVarAction {
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            op: EnvVarOp::Set,
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            op: EnvVarOp::Unset,
        }
    }

    pub fn env_file(artifact_dir: &Path) -> PathBuf {
        artifact_dir.join(ENV_FILE_NAME)
    }

    fn prefix(&self) -> String {
        format!("export {}=", self.name)
    }

    fn line(&self) -> String {
        format!("{}{}", self.prefix(), shell_quote(&self.value))
    }
}

impl Action for EnvVarAction {
    fn describe(&self) -> String {
        match self.op {
            EnvVarOp::Set => format!("persist {}={}", self.name, self.value),
            EnvVarOp::Unset => format!("remove {}", self.name),
        }
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        let path = Self::env_file(ctx.artifact_dir);
        let lines = read_lines(&path)?;
        let prefix = self.prefix();
        let existing = lines.iter().position(|l| l.starts_with(&prefix));

        match self.op {
            EnvVarOp::Set => {
                let line = self.line();
                let mut updated = lines.clone();
                match existing {
                    Some(index) if lines[index] == line => {
                        return Ok(ActionOutput::no_op(format!("{} already set", self.name)));
                    }
                    Some(index) => updated[index] = line,
                    None => updated.push(line),
                }
                write_lines(&path, &updated)?;
                Ok(ActionOutput::changed(format!(
                    "set {} in {}",
                    self.name,
                    path.display()
                )))
            }
            EnvVarOp::Unset => {
                let Some(index) = existing else {
                    return Ok(ActionOutput::no_op(format!("{} not set", self.name)));
                };
                let mut updated = lines;
                updated.remove(index);
                write_lines(&path, &updated)?;
                Ok(ActionOutput::changed(format!(
                    "removed {} from {}",
                    self.name,
                    path.display()
                )))
            }
        }
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>, StepError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StepError::io(format!("failed to read {}", path.display()), e)),
    }
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StepError::io(format!("failed to create {}", parent.display()), e))?;
    }
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    let tmp = path.with_extension("env.tmp");
    std::fs::write(&tmp, content)
        .map_err(|e| StepError::io(format!("failed to write {}", tmp.display()), e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| StepError::io(format!("failed to replace {}", path.display()), e))
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::detect::Environment;

    fn run(action: &EnvVarAction, dir: &Path) -> ActionOutput {
        let env = Environment::unknown();
        let ctx = ActionContext {
            env: &env,
            artifact_dir: dir,
            strategy: "pip",
            timeout: Duration::from_secs(1),
            non_interactive: true,
        };
        action.execute(&ctx).unwrap()
    }

    #[test]
    fn set_is_idempotent() {
        let temp = tempfile::TempDir::new().unwrap();
        let action = EnvVarAction::set("PYTORCH_ENABLE_MPS_FALLBACK", "1");

        assert!(run(&action, temp.path()).changed);
        let after_first = std::fs::read_to_string(EnvVarAction::env_file(temp.path())).unwrap();
        assert!(!run(&action, temp.path()).changed);
        let after_second = std::fs::read_to_string(EnvVarAction::env_file(temp.path())).unwrap();

        assert_eq!(after_first, after_second);
        assert_eq!(after_first, "export PYTORCH_ENABLE_MPS_FALLBACK='1'\n");
    }

    #[test]
    fn set_replaces_existing_value_in_place() {
        let temp = tempfile::TempDir::new().unwrap();
        run(&EnvVarAction::set("A", "1"), temp.path());
        run(&EnvVarAction::set("B", "2"), temp.path());
        run(&EnvVarAction::set("A", "3"), temp.path());

        let content = std::fs::read_to_string(EnvVarAction::env_file(temp.path())).unwrap();
        assert_eq!(content, "export A='3'\nexport B='2'\n");
    }

    #[test]
    fn unset_removes_only_its_line() {
        let temp = tempfile::TempDir::new().unwrap();
        run(&EnvVarAction::set("A", "1"), temp.path());
        run(&EnvVarAction::set("AB", "2"), temp.path());

        assert!(run(&EnvVarAction::unset("A"), temp.path()).changed);
        assert!(!run(&EnvVarAction::unset("A"), temp.path()).changed);

        let content = std::fs::read_to_string(EnvVarAction::env_file(temp.path())).unwrap();
        assert_eq!(content, "export AB='2'\n");
    }

    #[test]
    fn values_are_shell_quoted() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
