//! Rigup Core Library
//!
//! Provisioning orchestrator for single hosts: detects the platform, selects
//! the idempotent steps of a plan for it, runs them in a fixed order with a
//! per-step failure policy, records every outcome in an append-only
//! transcript and reverts applied steps in reverse order.

pub mod commands;
pub mod config;
pub mod context;
pub mod detect;
pub mod error;
pub mod executor;
pub mod lock;
pub mod process;
pub mod registry;
pub mod revert;
pub mod step;
pub mod transcript;
pub mod types;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{LoadedPlan, PlanFile, PlanStore, RunConfiguration};
    pub use crate::context::AppContext;

    // Detection
    pub use crate::detect::{Accelerator, Environment, GpuVendor};

    // Steps
    pub use crate::error::{StepError, TranscriptError};
    pub use crate::step::{Action, ActionContext, ActionOutput, ActionResult, FnAction, StepDefinition};

    // Execution
    pub use crate::executor::{AbortReason, Orchestrator, RunResult, StepOutcome, StopSignal};
    pub use crate::registry::{StepCatalog, StepRegistry, build_registry};
    pub use crate::revert::RevertEngine;
    pub use crate::transcript::{MemoryTranscript, Transcript, TranscriptSink};

    // Commands
    pub use crate::commands::{ProvisionCommand, ProvisionOptions};

    pub use crate::types::{Category, Mode, OsFamily, RunStatus, Severity, StepStatus};
}
