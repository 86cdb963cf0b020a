//! Shared core types used across step selection, execution and the transcript.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownVariant;

/// Operating-system family of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    #[serde(alias = "darwin")]
    MacOs,
    Linux,
    Windows,
    Unknown,
}

impl OsFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::MacOs => "macos",
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
            OsFamily::Unknown => "unknown",
        }
    }

    /// Map a `std::env::consts::OS` style identifier onto a family.
    pub fn from_os_str(os: &str) -> Self {
        match os.to_lowercase().as_str() {
            "macos" | "darwin" => OsFamily::MacOs,
            "linux" => OsFamily::Linux,
            "windows" => OsFamily::Windows,
            _ => OsFamily::Unknown,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of host state a step touches.
///
/// The declaration order is the apply order used by the step registry:
/// power tuning runs before service toggles, which run before package
/// installation, environment persistence and finally filesystem cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Power,
    Service,
    Package,
    #[serde(alias = "env-var", alias = "env")]
    EnvironmentVariable,
    #[serde(alias = "cleanup")]
    Filesystem,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Power,
        Category::Service,
        Category::Package,
        Category::EnvironmentVariable,
        Category::Filesystem,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Power => "power",
            Category::Service => "service",
            Category::Package => "package",
            Category::EnvironmentVariable => "environment-variable",
            Category::Filesystem => "filesystem",
        }
    }

    /// Position of the category in the fixed apply order.
    pub fn priority(self) -> u8 {
        match self {
            Category::Power => 0,
            Category::Service => 1,
            Category::Package => 2,
            Category::EnvironmentVariable => 3,
            Category::Filesystem => 4,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "power" => Ok(Category::Power),
            "service" => Ok(Category::Service),
            "package" => Ok(Category::Package),
            "environment-variable" | "env-var" | "env" => Ok(Category::EnvironmentVariable),
            "filesystem" | "cleanup" => Ok(Category::Filesystem),
            _ => Err(UnknownVariant::new("category", s)),
        }
    }
}

/// Whether a failing step stops the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    #[default]
    #[serde(alias = "warn")]
    WarnAndContinue,
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::WarnAndContinue => "warn-and-continue",
            Severity::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Apply,
    Revert,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Apply => "apply",
            Mode::Revert => "revert",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apply" => Ok(Mode::Apply),
            "revert" => Ok(Mode::Revert),
            _ => Err(UnknownVariant::new("mode", s)),
        }
    }
}

/// Result of executing (or not executing) a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Succeeded,
    Warned,
    FailedFatal,
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Warned => "warned",
            StepStatus::FailedFatal => "failed-fatal",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(StepStatus::Succeeded),
            "warned" => Ok(StepStatus::Warned),
            "failed-fatal" => Ok(StepStatus::FailedFatal),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(UnknownVariant::new("step status", s)),
        }
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    CompletedWithWarnings,
    Aborted,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithWarnings => "completed-with-warnings",
            RunStatus::Aborted => "aborted",
        }
    }

    /// Process exit code the CLI reports for this status.
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Completed | RunStatus::CompletedWithWarnings => 0,
            RunStatus::Aborted => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_order_matches_priority() {
        let mut sorted = Category::ALL.to_vec();
        sorted.sort_by_key(|c| c.priority());
        assert_eq!(sorted, Category::ALL.to_vec());
    }

    #[test]
    fn category_parses_aliases() {
        assert_eq!(
            "env-var".parse::<Category>().unwrap(),
            Category::EnvironmentVariable
        );
        assert_eq!("Cleanup".parse::<Category>().unwrap(), Category::Filesystem);
        let err = "gpu".parse::<Category>().unwrap_err();
        assert!(err.to_string().contains("gpu"));
    }

    #[test]
    fn severity_deserializes_short_form() {
        #[derive(Deserialize)]
        struct Wrapper {
            severity: Severity,
        }
        let parsed: Wrapper = toml::from_str("severity = \"warn\"").unwrap();
        assert_eq!(parsed.severity, Severity::WarnAndContinue);
        let parsed: Wrapper = toml::from_str("severity = \"fatal\"").unwrap();
        assert_eq!(parsed.severity, Severity::Fatal);
    }

    #[test]
    fn os_family_from_consts() {
        assert_eq!(OsFamily::from_os_str("linux"), OsFamily::Linux);
        assert_eq!(OsFamily::from_os_str("macos"), OsFamily::MacOs);
        assert_eq!(OsFamily::from_os_str("windows"), OsFamily::Windows);
        assert_eq!(OsFamily::from_os_str("freebsd"), OsFamily::Unknown);
    }

    #[test]
    fn step_status_round_trips_through_text() {
        for status in [
            StepStatus::Succeeded,
            StepStatus::Warned,
            StepStatus::FailedFatal,
            StepStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<StepStatus>().unwrap(), status);
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunStatus::Completed.exit_code(), 0);
        assert_eq!(RunStatus::CompletedWithWarnings.exit_code(), 0);
        assert_ne!(RunStatus::Aborted.exit_code(), 0);
    }
}
