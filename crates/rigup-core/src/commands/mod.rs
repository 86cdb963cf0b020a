//! High-level commands for rigup operations.
//!
//! This module provides the public API frontends call: previewing, applying
//! and reverting a plan, and reading back the transcript.

pub mod log;
pub mod provision;

pub use log::recent_runs;
pub use provision::{
    ExcludedStep, PlanPreview, PreviewStep, ProvisionCommand, ProvisionOptions, ProvisionReport,
};
