//! Implementation of the `baton status` command.
//!
//! Reports the global lock state (holder, age, staleness), held resource
//! locks, and whether a handover manifest is waiting.

use crate::audit;
use crate::config::Config;
use crate::context::require_initialized_workspace;
use crate::error::Result;
use crate::lock::{self, LockRecord, LockState};
use crate::manifest;
use crate::resource;

/// How many recent audit entries `status` shows.
const AUDIT_TAIL: usize = 5;

/// Execute the `baton status` command.
pub fn cmd_status() -> Result<()> {
    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    println!("Workspace Status");
    println!("================");
    println!();

    match lock::status_report(&ctx, &config)? {
        LockState::Free => {
            println!("Lock: free");
        }
        LockState::Held { record, stale } => {
            println!("Lock: held");
            println!("  Holder:     {}", record.holder);
            println!(
                "  Acquired:   {} ({} ago)",
                record.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
                LockRecord::format_age(record.held_for())
            );
            println!(
                "  Heartbeat:  {} ago",
                LockRecord::format_age(record.heartbeat_age())
            );
            println!("  Status:     {}", record.status);
            if let Some(reference) = &record.checkpoint_ref {
                println!("  Checkpoint: {}", reference);
            }
            if stale {
                println!(
                    "  STALE (holder dead or heartbeat older than {}s)",
                    config.stale_threshold_secs
                );
                println!("  Break with `baton break --force`.");
            }
            if record.status.needs_recovery() {
                println!("  Resolve with `baton recover <recover|rollback|abort>`.");
            }
        }
    }
    println!();

    let resources = resource::list_resources(&ctx, &config)?;
    if resources.is_empty() {
        println!("Resource locks: none");
    } else {
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
        }
    }
    println!();

    match manifest::read_manifest(&ctx)? {
        Some(manifest) => println!(
            "Handover manifest: from {} at workspace {}",
            manifest.previous_holder.engine, manifest.workspace_version
        ),
        None => println!("Handover manifest: none"),
    }
    println!();

    let recent = audit::tail(&ctx, AUDIT_TAIL)?;
    if recent.is_empty() {
        println!("Audit log: empty");
    } else {
        println!("Recent transitions:");
        for entry in &recent {
            println!(
                "  {} {} ({})",
                entry.ts.format("%Y-%m-%d %H:%M:%S"),
                entry.event,
                entry.holder
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::cmd_init;
    use crate::context::WorkspaceContext;
    use crate::lock::{DenyBreak, acquire};
    use crate::test_support::{DirGuard, create_test_repo};
    use serial_test::serial;

    #[test]
    #[serial]
    fn status_on_free_workspace() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        cmd_status().unwrap();
    }

    #[test]
    #[serial]
    fn status_with_held_lock_and_resources() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        let token = acquire(&ctx, &Config::default(), "gemini", None, &DenyBreak).unwrap();
        let key = resource::ResourceKey::parse("task:migrate").unwrap();
        resource::resource_acquire(&ctx, &Config::default(), &key, &token.holder).unwrap();

        cmd_status().unwrap();
    }

    #[test]
    #[serial]
    fn status_requires_initialized_workspace() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());

        assert!(cmd_status().is_err());
    }
}
