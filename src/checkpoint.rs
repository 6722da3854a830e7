//! Workspace checkpoint/restore primitive.
//!
//! The termination prepare phase records a restorable snapshot of the
//! workspace, and the rollback recovery path restores it. The capability is
//! a trait so tests and embedders can substitute their own store; the
//! shipped implementation is git-backed: a checkpoint commits any pending
//! changes and returns the resulting HEAD commit hash (content-addressed,
//! crash-safe, and doubling as the manifest's `workspace_version`), and
//! restore is a hard reset to that commit.

use crate::error::{BatonError, Result};
use crate::git;
use std::path::PathBuf;

/// Checkpoint/restore capability consumed by termination and recovery.
pub trait Checkpointer {
    /// Take a restorable snapshot of the workspace; returns its reference.
    fn checkpoint(&self, label: &str) -> Result<String>;

    /// Restore the workspace to a previously returned reference.
    fn restore(&self, reference: &str) -> Result<()>;

    /// Whether `reference` still names a restorable snapshot.
    fn exists(&self, reference: &str) -> bool;
}

/// Git-backed checkpointer operating on the workspace repository.
pub struct GitCheckpointer {
    repo_root: PathBuf,
}

impl GitCheckpointer {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }
}

impl Checkpointer for GitCheckpointer {
    fn checkpoint(&self, label: &str) -> Result<String> {
        if git::is_dirty(&self.repo_root)? {
            git::commit_all(&self.repo_root, label)
        } else {
            git::head_commit(&self.repo_root)
        }
    }

    fn restore(&self, reference: &str) -> Result<()> {
        if !git::commit_exists(&self.repo_root, reference) {
            return Err(BatonError::RollbackFailed(format!(
                "checkpoint '{}' does not name a commit in this workspace",
                reference
            )));
        }
        git::reset_hard(&self.repo_root, reference)
            .map_err(|e| BatonError::RollbackFailed(e.to_string()))
    }

    fn exists(&self, reference: &str) -> bool {
        git::commit_exists(&self.repo_root, reference)
    }
}
