#![allow(dead_code)]

use rigup_core::commands::ProvisionCommand;
use rigup_core::context::AppContext;
use rigup_core::detect::{Accelerator, Environment};
use rigup_core::types::OsFamily;
use tempfile::TempDir;

pub fn linux_host() -> Environment {
    Environment::new(OsFamily::Linux, "x86_64", Accelerator::None, false)
}

/// Command rooted in a fresh temp dir with `plan` as the default plan file.
pub fn isolated_command(plan: &str, env: Environment) -> (TempDir, ProvisionCommand) {
    let temp = TempDir::new().expect("Failed to create temp dir");
    let ctx = AppContext::under(temp.path());
    std::fs::create_dir_all(ctx.config_dir()).expect("Failed to create config dir");
    std::fs::write(ctx.plan_path(), plan).expect("Failed to write plan");
    (temp, ProvisionCommand::new(ctx).with_environment(env))
}
