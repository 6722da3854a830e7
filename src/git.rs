//! Git command runner for baton.
//!
//! Provides a safe wrapper around git commands with captured stdout/stderr
//! and structured error handling. The checkpoint/restore primitive and the
//! workspace-persistence commit step are built on these helpers; all git
//! access in the crate goes through this module.

use crate::error::{BatonError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Result of a successful git command execution.
#[derive(Debug, Clone)]
pub struct GitOutput {
    /// Standard output from the command (trimmed).
    pub stdout: String,
    /// Standard error from the command (trimmed).
    pub stderr: String,
}

impl GitOutput {
    fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Returns true if stdout is empty.
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty()
    }
}

/// Run a git command with the specified working directory.
///
/// Returns `Ok(GitOutput)` on exit code 0, `Err(BatonError::GitError)`
/// otherwise.
pub fn run_git<P: AsRef<Path>>(cwd: P, args: &[&str]) -> Result<GitOutput> {
    let output = Command::new("git")
        .current_dir(cwd.as_ref())
        .args(args)
        .output()
        .map_err(|e| {
            BatonError::GitError(format!(
                "failed to execute git {}: {}",
                args.first().unwrap_or(&""),
                e
            ))
        })?;

    let git_output = GitOutput::from_output(&output);

    if output.status.success() {
        Ok(git_output)
    } else {
        let exit_code = output.status.code().unwrap_or(-1);
        let error_msg = if git_output.stderr.is_empty() {
            git_output.stdout.clone()
        } else {
            git_output.stderr.clone()
        };

        Err(BatonError::GitError(format!(
            "git {} failed (exit code {}): {}",
            args.first().unwrap_or(&""),
            exit_code,
            error_msg
        )))
    }
}

/// Get the repository root directory using `git rev-parse --show-toplevel`.
///
/// "Not in a git repo" is reported as a clean `UserError` (exit 1) rather
/// than a `GitError`, since it is an invocation mistake, not a git failure.
pub fn get_repo_root<P: AsRef<Path>>(cwd: P) -> Result<PathBuf> {
    let output = Command::new("git")
        .current_dir(cwd.as_ref())
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .map_err(|e| BatonError::GitError(format!("failed to execute git rev-parse: {}", e)))?;

    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(PathBuf::from(stdout))
    } else {
        Err(BatonError::UserError(
            "not inside a git repository.\n\
             baton coordinates engines against a git-managed workspace; \
             run it from within the workspace repository."
                .to_string(),
        ))
    }
}

/// Return the current HEAD commit hash.
pub fn head_commit<P: AsRef<Path>>(repo: P) -> Result<String> {
    let output = run_git(repo, &["rev-parse", "HEAD"])?;
    Ok(output.stdout)
}

/// Return true if the working tree has uncommitted or untracked changes.
pub fn is_dirty<P: AsRef<Path>>(repo: P) -> Result<bool> {
    let output = run_git(repo, &["status", "--porcelain"])?;
    Ok(!output.is_empty())
}

/// Stage everything and commit with the given message.
///
/// Returns the new HEAD commit hash. Fails if there is nothing to commit;
/// callers check `is_dirty` first.
pub fn commit_all<P: AsRef<Path>>(repo: P, message: &str) -> Result<String> {
    let repo = repo.as_ref();
    run_git(repo, &["add", "-A"])?;
    run_git(repo, &["commit", "-m", message])?;
    head_commit(repo)
}

/// Hard-reset the working tree and index to `commit`.
pub fn reset_hard<P: AsRef<Path>>(repo: P, commit: &str) -> Result<()> {
    run_git(repo, &["reset", "--hard", commit])?;
    Ok(())
}

/// Return true if `commit` names an existing commit object.
pub fn commit_exists<P: AsRef<Path>>(repo: P, commit: &str) -> bool {
    run_git(
        repo,
        &["cat-file", "-e", &format!("{}^{{commit}}", commit)],
    )
    .is_ok()
}
