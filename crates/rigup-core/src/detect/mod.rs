//! Host capability detection.
//!
//! Produces the immutable [`Environment`] every later stage reads. Detection
//! never fails: anything that cannot be determined falls back to `Unknown`,
//! no accelerator, or no elevated privilege.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::{Invocation, find_program};
use crate::types::OsFamily;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Vendor of a graphics/compute adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other,
}

impl GpuVendor {
    pub fn as_str(self) -> &'static str {
        match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Intel => "intel",
            GpuVendor::Apple => "apple",
            GpuVendor::Other => "other",
        }
    }
}

/// Accelerator available to AI workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "vendor", rename_all = "lowercase")]
pub enum Accelerator {
    #[default]
    None,
    Integrated,
    Discrete(GpuVendor),
}

impl Accelerator {
    pub fn is_discrete(self) -> bool {
        matches!(self, Accelerator::Discrete(_))
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accelerator::None => f.write_str("none"),
            Accelerator::Integrated => f.write_str("integrated"),
            Accelerator::Discrete(vendor) => write!(f, "discrete-{}", vendor.as_str()),
        }
    }
}

/// Immutable snapshot of the host taken once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    os: OsFamily,
    arch: String,
    accelerator: Accelerator,
    elevated: bool,
}

impl Environment {
    pub fn new(os: OsFamily, arch: impl Into<String>, accelerator: Accelerator, elevated: bool) -> Self {
        Self {
            os,
            arch: normalize_arch(&arch.into()),
            accelerator,
            elevated,
        }
    }

    /// Environment for a host nothing is known about.
    pub fn unknown() -> Self {
        Self::new(OsFamily::Unknown, "unknown", Accelerator::None, false)
    }

    pub fn os(&self) -> OsFamily {
        self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn accelerator(&self) -> Accelerator {
        self.accelerator
    }

    pub fn elevated(&self) -> bool {
        self.elevated
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} accelerator={} elevated={}",
            self.os, self.arch, self.accelerator, self.elevated
        )
    }
}

/// Source of raw host facts. Lets detection run against a fake host in tests.
pub trait HostProbe {
    /// `std::env::consts::OS` style identifier.
    fn os(&self) -> &str;

    /// `std::env::consts::ARCH` style identifier.
    fn arch(&self) -> &str;

    fn has_program(&self, name: &str) -> bool;

    /// Stdout of a command that exited successfully, `None` otherwise.
    fn command_stdout(&self, argv: &[&str]) -> Option<String>;
}

/// Probe backed by the real host.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    timeout: Duration,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self {
            timeout: PROBE_TIMEOUT,
        }
    }
}

impl HostProbe for SystemProbe {
    fn os(&self) -> &str {
        std::env::consts::OS
    }

    fn arch(&self) -> &str {
        std::env::consts::ARCH
    }

    fn has_program(&self, name: &str) -> bool {
        find_program(name).is_some()
    }

    fn command_stdout(&self, argv: &[&str]) -> Option<String> {
        let (program, args) = argv.split_first()?;
        let output = Invocation::new(*program)
            .with_args(args.iter().copied())
            .output(self.timeout)
            .ok()?;
        output.success().then_some(output.stdout)
    }
}

/// Detect the current host. The first result is memoized for the process.
pub fn detect() -> Environment {
    static DETECTED: OnceLock<Environment> = OnceLock::new();
    DETECTED
        .get_or_init(|| {
            let env = detect_with(&SystemProbe::default());
            tracing::info!(environment = %env, "Detected host environment");
            env
        })
        .clone()
}

/// Detect using an explicit probe, without memoization.
pub fn detect_with(probe: &dyn HostProbe) -> Environment {
    let os = OsFamily::from_os_str(probe.os());
    if os == OsFamily::Unknown {
        return Environment::new(os, probe.arch(), Accelerator::None, false);
    }
    let accelerator = detect_accelerator(os, probe);
    let elevated = detect_elevation(os, probe);
    Environment::new(os, probe.arch(), accelerator, elevated)
}

fn detect_accelerator(os: OsFamily, probe: &dyn HostProbe) -> Accelerator {
    if probe.has_program("nvidia-smi")
        && probe
            .command_stdout(&["nvidia-smi", "-L"])
            .is_some_and(|out| out.lines().any(|l| l.trim_start().starts_with("GPU")))
    {
        return Accelerator::Discrete(GpuVendor::Nvidia);
    }
    if probe.has_program("rocm-smi")
        && probe
            .command_stdout(&["rocm-smi", "--showproductname"])
            .is_some_and(|out| !out.trim().is_empty())
    {
        return Accelerator::Discrete(GpuVendor::Amd);
    }

    match os {
        OsFamily::Linux => probe
            .command_stdout(&["lspci"])
            .map(|out| {
                let adapters: Vec<&str> = out
                    .lines()
                    .filter(|l| {
                        let lower = l.to_lowercase();
                        lower.contains("vga") || lower.contains("3d controller")
                    })
                    .collect();
                classify_adapters(&adapters)
            })
            .unwrap_or_default(),
        OsFamily::Windows => probe
            .command_stdout(&["wmic", "path", "win32_VideoController", "get", "Name"])
            .map(|out| {
                let adapters: Vec<&str> = out
                    .lines()
                    .skip(1)
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                classify_adapters(&adapters)
            })
            .unwrap_or_default(),
        OsFamily::MacOs => {
            if normalize_arch(probe.arch()) == "aarch64" {
                Accelerator::Integrated
            } else {
                Accelerator::None
            }
        }
        OsFamily::Unknown => Accelerator::None,
    }
}

/// Pick the most capable adapter from a list of adapter descriptions.
fn classify_adapters(adapters: &[&str]) -> Accelerator {
    let mut best = Accelerator::None;
    for adapter in adapters {
        let lower = adapter.to_lowercase();
        let found = if lower.contains("nvidia") {
            Accelerator::Discrete(GpuVendor::Nvidia)
        } else if lower.contains("radeon") || lower.contains("amd") || lower.contains(" ati ") {
            Accelerator::Discrete(GpuVendor::Amd)
        } else if lower.contains("intel") && lower.contains("arc") {
            Accelerator::Discrete(GpuVendor::Intel)
        } else if lower.contains("intel") {
            Accelerator::Integrated
        } else {
            continue;
        };
        best = match (best, found) {
            (Accelerator::Discrete(_), _) => best,
            (_, Accelerator::Discrete(_)) => found,
            (Accelerator::None, _) => found,
            _ => best,
        };
    }
    best
}

fn detect_elevation(os: OsFamily, probe: &dyn HostProbe) -> bool {
    match os {
        OsFamily::Linux | OsFamily::MacOs => probe
            .command_stdout(&["id", "-u"])
            .is_some_and(|uid| uid.trim() == "0"),
        // `net session` only succeeds from an elevated prompt.
        OsFamily::Windows => probe.command_stdout(&["net", "session"]).is_some(),
        OsFamily::Unknown => false,
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch.trim().to_lowercase().as_str() {
        "" => "unknown".to_string(),
        "x86_64" | "amd64" | "x64" => "x86_64".to_string(),
        "aarch64" | "arm64" => "aarch64".to_string(),
        other => other.to_string(),
    }
}
