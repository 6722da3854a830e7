//! Implementation of the `baton acquire` command.

use super::{break_policy, print_handover_highlights};
use crate::cli::AcquireArgs;
use crate::config::Config;
use crate::context::require_initialized_workspace;
use crate::error::Result;
use crate::lock;

/// Execute the `baton acquire` command.
///
/// Acquisition never blocks: a held lock fails fast with the holder's
/// identity and age so the operator can decide to wait or intervene. On
/// success, the previous session's handover manifest is surfaced before
/// any work begins.
pub fn cmd_acquire(args: AcquireArgs) -> Result<()> {
    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    let policy = break_policy(args.break_stale, args.yes);
    let token = lock::acquire(&ctx, &config, &args.engine, args.pid, policy.as_ref())?;

    println!(
        "Acquired workspace lock as {} at {}.",
        token.holder,
        token.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();
    print_handover_highlights(&ctx)?;
    println!();
    if args.pid.is_none() {
        println!(
            "Detached holder: keep the lock fresh with `baton heartbeat {}` \
             (stale after {}s without one).",
            args.engine, config.stale_threshold_secs
        );
    }
    println!("Release with `baton release {}`.", args.engine);

    Ok(())
}
