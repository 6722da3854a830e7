//! Implementation of the `baton init` command.
//!
//! Bootstraps the coordination state directory at the workspace root:
//!
//! 1. Creates `.baton/`, `.baton/audit/`, `.baton/resources/`
//! 2. Writes `baton.yaml` with defaults (if missing)
//! 3. Adds `.baton/` to `.git/info/exclude` so workspace checkpoints never
//!    capture coordination state
//!
//! Idempotent: running it again neither errors nor overwrites an existing
//! configuration.

use crate::config::Config;
use crate::context::WorkspaceContext;
use crate::error::{BatonError, Result};
use crate::fs::atomic_write_file;
use crate::git;
use std::fs;

/// Execute the `baton init` command.
pub fn cmd_init() -> Result<()> {
    let ctx = WorkspaceContext::resolve()?;

    let already = ctx.is_initialized();

    fs::create_dir_all(ctx.audit_dir()).map_err(|e| {
        BatonError::UserError(format!("failed to create audit directory: {}", e))
    })?;
    fs::create_dir_all(ctx.resources_dir()).map_err(|e| {
        BatonError::UserError(format!("failed to create resources directory: {}", e))
    })?;

    if !ctx.config_path().exists() {
        let config = Config::default();
        atomic_write_file(ctx.config_path(), &config.to_yaml()?)?;
    }

    add_to_git_exclude(&ctx)?;

    if already {
        println!("baton already initialized; state left untouched.");
    } else {
        println!("Initialized baton coordination state.");
    }
    println!();
    println!("State directory: {}", ctx.state_dir.display());
    println!("  lock.json        global exclusivity token (absent = free)");
    println!("  manifest.json    handover manifest slot");
    println!("  audit/           append-only transition log");
    println!("  resources/       fine-grained resource locks");
    println!("  baton.yaml       configuration");
    println!();
    println!("Acquire the workspace with `baton acquire <engine>`.");

    Ok(())
}

/// Keep coordination state out of version control.
fn add_to_git_exclude(ctx: &WorkspaceContext) -> Result<()> {
    let git_dir = git::run_git(&ctx.workspace_root, &["rev-parse", "--git-dir"])?.stdout;
    let git_dir = if std::path::Path::new(&git_dir).is_absolute() {
        std::path::PathBuf::from(git_dir)
    } else {
        ctx.workspace_root.join(git_dir)
    };

    let exclude_path = git_dir.join("info").join("exclude");
    let entry = format!("{}/", crate::context::STATE_DIR);

    let existing = fs::read_to_string(&exclude_path).unwrap_or_default();
    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }

    if let Some(parent) = exclude_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BatonError::UserError(format!("failed to create git info directory: {}", e))
        })?;
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&entry);
    content.push('\n');

    fs::write(&exclude_path, content).map_err(|e| {
        BatonError::UserError(format!(
            "failed to update '{}': {}",
            exclude_path.display(),
            e
        ))
    })?;

    Ok(())
}
