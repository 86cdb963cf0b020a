//! Bounded execution of external processes.
//!
//! Every external tool a step invokes goes through [`Invocation::run`], which
//! waits at most the given timeout and kills the child when the wait expires.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{StepError, ToolFailure};

const STDERR_PREVIEW_CHARS: usize = 2_000;

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A single external command: program, arguments, extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Build from an argv vector; the first element is the program.
    pub fn from_argv(argv: &[String]) -> Result<Self, StepError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| StepError::failed("empty command line"))?;
        Ok(Self::new(program.clone()).with_args(args.iter().cloned()))
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Human-readable command line for logs and messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command and require a zero exit status.
    pub fn run(&self, limit: Duration) -> Result<CommandOutput, StepError> {
        let output = self.output(limit)?;
        if output.success() {
            return Ok(output);
        }
        let status = match output.code {
            Some(code) => format!("exit status {code}"),
            None => "termination by signal".to_string(),
        };
        Err(StepError::ExternalToolFailure {
            program: self.program.clone(),
            reason: ToolFailure::Exit {
                status,
                stderr: preview_text(&output.stderr, STDERR_PREVIEW_CHARS),
            },
        })
    }

    /// Run the command and return its output whatever the exit status.
    ///
    /// Errors only when the process cannot be started, waited on, or exceeds
    /// `limit`.
    pub fn output(&self, limit: Duration) -> Result<CommandOutput, StepError> {
        tracing::debug!(command = %self.display(), timeout_secs = limit.as_secs(), "Running external command");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StepError::io("failed to start process runtime", e))?;

        runtime.block_on(async {
            let mut cmd = Command::new(&self.program);
            cmd.args(&self.args);
            if !self.env.is_empty() {
                cmd.envs(&self.env);
            }
            if let Some(dir) = &self.working_dir {
                cmd.current_dir(dir);
            }
            // Own process group: a terminal Ctrl-C must not reach a running step.
            #[cfg(unix)]
            cmd.process_group(0);
            cmd.kill_on_drop(true)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let child = cmd.spawn().map_err(|e| self.failure(ToolFailure::Spawn(e)))?;

            match timeout(limit, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }),
                Ok(Err(e)) => Err(self.failure(ToolFailure::Wait(e))),
                // Dropping the wait future drops the child, which kills it.
                Err(_) => Err(self.failure(ToolFailure::TimedOut(limit))),
            }
        })
    }

    fn failure(&self, reason: ToolFailure) -> StepError {
        StepError::ExternalToolFailure {
            program: self.program.clone(),
            reason,
        }
    }
}

/// Look up an executable on `PATH` without running it.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let candidates: Vec<String> = if cfg!(windows) {
        vec![format!("{name}.exe"), format!("{name}.cmd"), name.to_string()]
    } else {
        vec![name.to_string()]
    };
    std::env::split_paths(&path)
        .flat_map(|dir| candidates.iter().map(move |c| dir.join(c)))
        .find(|candidate| candidate.is_file())
}

fn preview_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let head: String = trimmed.chars().take(max_chars).collect();
    format!("{head}...")
}
