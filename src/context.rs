//! Workspace context resolution for baton.
//!
//! Finds the workspace root (the git repository toplevel) from any working
//! directory and resolves the canonical coordination paths under `.baton/`.
//! All commands go through this module so that coordination state is always
//! located at the workspace root regardless of where baton is invoked from.

use crate::error::{BatonError, Result};
use crate::git;
use std::env;
use std::path::{Path, PathBuf};

/// Coordination state directory name at the workspace root.
pub const STATE_DIR: &str = ".baton";

/// Resolved paths for the baton coordination state.
///
/// All paths are absolute.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    /// Absolute path to the workspace root (git repository toplevel).
    pub workspace_root: PathBuf,

    /// Absolute path to the coordination state directory (`{root}/.baton/`).
    pub state_dir: PathBuf,
}

impl WorkspaceContext {
    /// Resolve the workspace context from the current working directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            BatonError::UserError(format!("failed to get current working directory: {}", e))
        })?;
        Self::resolve_from(&cwd)
    }

    /// Resolve the workspace context from a specific directory.
    pub fn resolve_from<P: AsRef<Path>>(cwd: P) -> Result<Self> {
        let workspace_root = git::get_repo_root(cwd)?;
        let state_dir = workspace_root.join(STATE_DIR);
        Ok(Self {
            workspace_root,
            state_dir,
        })
    }

    /// Check if the coordination state directory exists.
    pub fn is_initialized(&self) -> bool {
        self.state_dir.exists()
    }

    /// Ensure the coordination state is initialized, erroring if not.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.state_dir.exists() {
            return Err(BatonError::UserError(format!(
                "baton is not initialized for this workspace.\n\
                 Expected state directory at: {}\n\n\
                 Run `baton init` to initialize it.",
                self.state_dir.display()
            )));
        }
        Ok(())
    }

    /// Path to the global lock record. Absence of this file means the
    /// workspace is free.
    pub fn lock_record_path(&self) -> PathBuf {
        self.state_dir.join("lock.json")
    }

    /// Path to the single-slot handover manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.state_dir.join("manifest.json")
    }

    /// Path to the manifest draft an engine authors during its session;
    /// consumed by the release sequence.
    pub fn manifest_draft_path(&self) -> PathBuf {
        self.state_dir.join("handover-draft.yaml")
    }

    /// Path to the audit log directory.
    pub fn audit_dir(&self) -> PathBuf {
        self.state_dir.join("audit")
    }

    /// Path to the append-only audit log file.
    pub fn audit_file(&self) -> PathBuf {
        self.audit_dir().join("audit.ndjson")
    }

    /// Path to the resource-lock directory.
    pub fn resources_dir(&self) -> PathBuf {
        self.state_dir.join("resources")
    }

    /// Path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join("baton.yaml")
    }
}

/// Convenience function to resolve context and ensure baton is initialized.
///
/// Use this in every command except `init`.
pub fn require_initialized_workspace() -> Result<WorkspaceContext> {
    let ctx = WorkspaceContext::resolve()?;
    ctx.ensure_initialized()?;
    Ok(ctx)
}
