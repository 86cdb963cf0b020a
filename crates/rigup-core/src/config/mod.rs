//! Plan files and run configuration
//!
//! A plan file declares the steps; a [`RunConfiguration`] carries the
//! resolved per-run choices (mode, strategy, skips, locations).

pub mod parser;
pub mod paths;
pub mod run_config;
pub mod schema;
pub mod store;

pub use parser::{parse_plan_str, parse_plan_toml, plan_digest};
pub use run_config::{DEFAULT_STRATEGY, RunConfiguration};
pub use schema::{ActionSpec, CommandSpec, EnvVarSpec, FileSpec, PlanDefaults, PlanFile, StepSpec};
pub use store::{BUILTIN_PLAN, LoadedPlan, PlanSource, PlanStore};
