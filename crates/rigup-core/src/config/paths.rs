//! Default locations for plans, transcripts, locks and generated artifacts.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "rigup";

/// `<config dir>/rigup`
pub fn default_config_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join(APP_DIR))
}

/// `<state dir>/rigup`, falling back to the local data dir where no state dir exists.
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .ok_or_else(|| anyhow::anyhow!("Could not determine state directory"))?
        .join(APP_DIR))
}

/// `<local data dir>/rigup/artifacts`
pub fn default_artifact_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::data_local_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
        .join(APP_DIR)
        .join("artifacts"))
}

pub fn plan_path(config_dir: &Path) -> PathBuf {
    config_dir.join("plan.toml")
}

pub fn transcript_path(state_dir: &Path) -> PathBuf {
    state_dir.join("transcript.log")
}

pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join("run.lock")
}
