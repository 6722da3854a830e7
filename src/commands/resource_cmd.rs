//! Implementation of the `baton resource` subcommands.

use crate::cli::{ResourceAction, ResourceBreakArgs, ResourceCommand, ResourceKeyArgs};
use crate::config::Config;
use crate::context::require_initialized_workspace;
use crate::error::{BatonError, Result};
use crate::lock::{HolderId, LockRecord};
use crate::resource::{self, ResourceKey};

/// Dispatch resource subcommands.
pub fn dispatch_resource(resource_cmd: ResourceCommand) -> Result<()> {
    match resource_cmd.action {
        ResourceAction::Acquire(args) => cmd_resource_acquire(args),
        ResourceAction::Release(args) => cmd_resource_release(args),
        ResourceAction::List => cmd_resource_list(),
        ResourceAction::Break(args) => cmd_resource_break(args),
    }
}

fn holder_from_args(args: &ResourceKeyArgs) -> HolderId {
    match args.pid {
        Some(pid) => HolderId::with_pid(&args.engine, pid),
        None => HolderId::detached(&args.engine),
    }
}

fn cmd_resource_acquire(args: ResourceKeyArgs) -> Result<()> {
    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    let key = ResourceKey::parse(&args.key)?;
    let holder = holder_from_args(&args);

    resource::resource_acquire(&ctx, &config, &key, &holder)?;

    println!("Granted {} to {}.", key, holder);
    Ok(())
}

fn cmd_resource_release(args: ResourceKeyArgs) -> Result<()> {
    let ctx = require_initialized_workspace()?;

    let key = ResourceKey::parse(&args.key)?;
    let holder = holder_from_args(&args);

    resource::resource_release(&ctx, &key, &holder)?;

    println!("Released {}.", key);
    Ok(())
}

fn cmd_resource_list() -> Result<()> {
    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    let resources = resource::list_resources(&ctx, &config)?;
    if resources.is_empty() {
        println!("No resource locks held.");
        return Ok(());
    }

    println!("Resource locks ({}):", resources.len());
    for info in &resources {
        let stale_marker = if info.is_stale { " [STALE]" } else { "" };
        println!(
            "  {} (by {}, {} ago){}",
            info.lock.resource_key,
            info.lock.holder,
            LockRecord::format_age(
                chrono::Utc::now().signed_duration_since(info.lock.acquired_at)
            ),
            stale_marker
        );
        println!("    at {}", info.path.display());
    }

    let stale_count = resources.iter().filter(|info| info.is_stale).count();
    if stale_count > 0 {
        println!();
        println!(
            "Note: {} lock(s) are stale. Clear with `baton resource break <key> --force`.",
            stale_count
        );
    }

    Ok(())
}

fn cmd_resource_break(args: ResourceBreakArgs) -> Result<()> {
    if !args.force {
        return Err(BatonError::UserError(format!(
            "refusing to clear resource lock without --force.\n\n\
             Clearing a lock whose holder is still working causes conflicting edits.\n\n\
             To proceed: baton resource break {} --force",
            args.key
        )));
    }

    let ctx = require_initialized_workspace()?;
    let key = ResourceKey::parse(&args.key)?;

    let broken = resource::resource_break(&ctx, &key)?;

    println!("Cleared {} (was held by {}).", key, broken.holder);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ResourceAction;
    use crate::commands::init::cmd_init;
    use crate::context::WorkspaceContext;
    use crate::test_support::{DirGuard, create_test_repo};
    use serial_test::serial;

    fn key_args(key: &str, engine: &str) -> ResourceKeyArgs {
        ResourceKeyArgs {
            key: key.to_string(),
            engine: engine.to_string(),
            pid: None,
        }
    }

    #[test]
    #[serial]
    fn acquire_release_cycle_through_commands() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        cmd_resource_acquire(key_args("file:src/lib.rs", "gemini")).unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        let config = Config::default();
        assert_eq!(resource::list_resources(&ctx, &config).unwrap().len(), 1);

        cmd_resource_release(key_args("file:src/lib.rs", "gemini")).unwrap();
        assert!(resource::list_resources(&ctx, &config).unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn contended_acquire_fails_through_commands() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        cmd_resource_acquire(key_args("task:migrate", "gemini")).unwrap();

        let err = cmd_resource_acquire(key_args("task:migrate", "claude")).unwrap_err();
        assert!(matches!(err, BatonError::ResourceBusy { .. }));
    }

    #[test]
    #[serial]
    fn break_requires_force() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        cmd_resource_acquire(key_args("task:migrate", "gemini")).unwrap();

        let err = cmd_resource_break(ResourceBreakArgs {
            key: "task:migrate".to_string(),
            force: false,
        })
        .unwrap_err();
        assert!(err.to_string().contains("--force"));

        cmd_resource_break(ResourceBreakArgs {
            key: "task:migrate".to_string(),
            force: true,
        })
        .unwrap();
    }

    #[test]
    #[serial]
    fn dispatch_routes_list() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        dispatch_resource(ResourceCommand {
            action: ResourceAction::List,
        })
        .unwrap();
    }
}
