//! Generated artifact files (activation scripts, config snippets) under the artifact directory.

use std::path::{Component, Path, PathBuf};

use crate::error::StepError;
use crate::step::{Action, ActionContext, ActionOutput, ActionResult};

/// Whether the action writes the artifact or removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOp {
    Write,
    Remove,
}

/// Writes `contents` to a path relative to the artifact directory.
///
/// Removal only deletes the file while it still holds the generated contents,
/// so edits made after generation are never lost.
#[derive(Debug, Clone)]
pub struct FileArtifactAction {
    relative_path: PathBuf,
    contents: String,
    executable: bool,
    op: ArtifactOp,
}

impl FileArtifactAction {
    pub fn write(relative_path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: contents.into(),
            executable: false,
            op: ArtifactOp::Write,
        }
    }

    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    /// The inverse of this action: remove the generated file.
    pub fn inverse(&self) -> Self {
        Self {
            op: ArtifactOp::Remove,
            ..self.clone()
        }
    }

    fn target(&self, ctx: &ActionContext<'_>) -> Result<PathBuf, StepError> {
        ensure_relative_path(&self.relative_path)?;
        Ok(ctx.artifact_dir.join(&self.relative_path))
    }

    fn write_file(&self, path: &Path) -> ActionResult {
        if std::fs::read_to_string(path).is_ok_and(|current| current == self.contents) {
            if self.executable && make_executable(path)? {
                return Ok(ActionOutput::changed(format!(
                    "restored executable mode on {}",
                    path.display()
                )));
            }
            return Ok(ActionOutput::no_op(format!("{} is up to date", path.display())));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StepError::io(format!("failed to create {}", parent.display()), e))?;
        }
        std::fs::write(path, &self.contents)
            .map_err(|e| StepError::io(format!("failed to write {}", path.display()), e))?;
        if self.executable {
            make_executable(path)?;
        }
        Ok(ActionOutput::changed(format!("wrote {}", path.display())))
    }

    fn remove_file(&self, path: &Path) -> ActionResult {
        let current = match std::fs::read_to_string(path) {
            Ok(current) => current,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ActionOutput::no_op(format!("{} already absent", path.display())));
            }
            Err(e) => return Err(StepError::io(format!("failed to read {}", path.display()), e)),
        };
        if current != self.contents {
            return Err(StepError::PreconditionUnmet(format!(
                "{} was modified after generation; leaving it in place",
                path.display()
            )));
        }
        std::fs::remove_file(path)
            .map_err(|e| StepError::io(format!("failed to remove {}", path.display()), e))?;
        Ok(ActionOutput::changed(format!("removed {}", path.display())))
    }
}

impl Action for FileArtifactAction {
    fn describe(&self) -> String {
        match self.op {
            ArtifactOp::Write => format!("write {}", self.relative_path.display()),
            ArtifactOp::Remove => format!("remove {}", self.relative_path.display()),
        }
    }

    fn execute(&self, ctx: &ActionContext<'_>) -> ActionResult {
        let path = self.target(ctx)?;
        match self.op {
            ArtifactOp::Write => self.write_file(&path),
            ArtifactOp::Remove => self.remove_file(&path),
        }
    }
}

fn ensure_relative_path(path: &Path) -> Result<(), StepError> {
    if path.as_os_str().is_empty() {
        return Err(StepError::failed("artifact path is empty"));
    }
    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(StepError::failed(
                    "path traversal is not allowed in artifact paths",
                ));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(StepError::failed(
                    "absolute paths are not allowed in artifact paths",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Set mode 0755. Returns whether the mode had to change.
#[cfg(unix)]
fn make_executable(path: &Path) -> Result<bool, StepError> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| StepError::io(format!("failed to stat {}", path.display()), e))?
        .permissions();
    if perms.mode() & 0o777 == 0o755 {
        return Ok(false);
    }
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)
        .map_err(|e| StepError::io(format!("failed to chmod {}", path.display()), e))?;
    Ok(true)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<bool, StepError> {
    Ok(false)
}
