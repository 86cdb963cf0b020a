//! Error taxonomy for step actions and the transcript.
//!
//! Action failures never escape the orchestrator: every [`StepError`] is turned
//! into a step outcome. [`TranscriptError`] is the one condition that ends a
//! run abnormally.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a step's apply or revert action.
#[derive(Debug, Error)]
pub enum StepError {
    /// A requirement of the step does not hold on this host.
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    /// An external process could not be launched, exited non-zero or timed out.
    #[error("`{program}` {reason}")]
    ExternalToolFailure {
        program: String,
        reason: ToolFailure,
    },

    /// Local filesystem work inside an action failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Free-form failure from a caller-provided action.
    #[error("{0}")]
    Failed(String),
}

impl StepError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StepError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            StepError::ExternalToolFailure {
                reason: ToolFailure::TimedOut(_),
                ..
            }
        )
    }
}

/// Why an external tool invocation failed.
#[derive(Debug, Error)]
pub enum ToolFailure {
    #[error("could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exited with {status}{}", stderr_suffix(.stderr))]
    Exit { status: String, stderr: String },

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("failed while waiting for output: {0}")]
    Wait(#[source] std::io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// The transcript could not be written; the audit trail is no longer trustworthy.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("failed to open transcript {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write transcript {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read transcript {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A textual value that does not name any known variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_failure_includes_stderr() {
        let err = StepError::ExternalToolFailure {
            program: "apt-get".to_string(),
            reason: ToolFailure::Exit {
                status: "exit status: 100".to_string(),
                stderr: "E: Could not get lock\n".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "`apt-get` exited with exit status: 100: E: Could not get lock"
        );
    }

    #[test]
    fn timeout_is_detectable() {
        let err = StepError::ExternalToolFailure {
            program: "pip".to_string(),
            reason: ToolFailure::TimedOut(Duration::from_secs(30)),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "`pip` timed out after 30s");
    }
}
