//! Per-host run lock.
//!
//! Only one orchestrator run may modify a host at a time. The lock is a file
//! created exclusively and removed when the guard drops.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock at `path`, failing if another run holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let lock = Self { path }.stamp(&mut file)?;
                tracing::debug!(path = %lock.path.display(), "Acquired run lock");
                Ok(lock)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = std::fs::read_to_string(&path).unwrap_or_default();
                anyhow::bail!(
                    "Another run is in progress (lock {} held by {}). Remove the lock file if no run is active.",
                    path.display(),
                    holder.trim()
                )
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to create lock file: {}", path.display()))
            }
        }
    }

    /// Record the holder. On error the guard drops and the file is removed.
    fn stamp(self, out: &mut impl Write) -> anyhow::Result<Self> {
        writeln!(
            out,
            "pid={} started={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )
        .with_context(|| format!("Failed to write lock file: {}", self.path.display()))?;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
