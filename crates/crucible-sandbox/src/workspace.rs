//! Ephemeral, execution-scoped staging directory.

use crucible_core::{ExecError, ExecutionRequest};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A uniquely named staging directory, exclusively owned by one execution.
///
/// The backing directory is removed when the workspace is closed or
/// dropped, whichever comes first, including on error and cancellation
/// paths.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    /// Canonicalized root, suitable for a bind mount.
    root: PathBuf,
}

impl Workspace {
    /// Stage a request: write the canonical main file and every auxiliary
    /// file.
    ///
    /// All auxiliary paths are validated before anything is created or
    /// written; a path that is absolute or walks upward rejects the whole
    /// request with [`ExecError::PathTraversal`].
    pub async fn stage(request: &ExecutionRequest, main_file: &str) -> Result<Self, ExecError> {
        for rel in request.files.keys() {
            validate_rel_path(rel)?;
        }

        let dir = TempDir::with_prefix("crucible-")
            .map_err(|e| ExecError::Runtime(format!("failed to create workspace: {e}")))?;
        let root = dir
            .path()
            .canonicalize()
            .map_err(|e| ExecError::Runtime(format!("failed to resolve workspace: {e}")))?;

        tokio::fs::write(root.join(main_file), &request.code)
            .await
            .map_err(|e| ExecError::Runtime(format!("failed to write {main_file}: {e}")))?;

        for (rel, content) in &request.files {
            let resolved = root.join(rel);
            if let Some(parent) = resolved.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ExecError::Runtime(format!("failed to create {rel}: {e}")))?;
            }
            tokio::fs::write(&resolved, content)
                .await
                .map_err(|e| ExecError::Runtime(format!("failed to write {rel}: {e}")))?;
        }

        debug!(
            workspace = %root.display(),
            files = request.files.len() + 1,
            "workspace staged"
        );

        Ok(Self { dir, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete the workspace now, logging (not propagating) failure; the
    /// directory is already being discarded. Dropping without calling this
    /// removes it as well.
    pub fn close(self) {
        let path = self.root;
        if let Err(e) = self.dir.close() {
            warn!(workspace = %path.display(), error = %e, "workspace removal failed");
        } else {
            debug!(workspace = %path.display(), "workspace removed");
        }
    }
}

/// Reject absolute paths and any component that walks upward.
fn validate_rel_path(rel: &str) -> Result<(), ExecError> {
    let path = Path::new(rel);
    if path.is_absolute() {
        return Err(ExecError::PathTraversal(rel.to_owned()));
    }
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ExecError::PathTraversal(rel.to_owned()));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}
