//! Implementation of the `baton break` command.
//!
//! Force-breaking is the two-keyed path out of a stale lock: the lock must
//! actually be stale (dead holder, or heartbeat past the threshold), and
//! the operator must confirm. A live lock is never breakable from here;
//! wait for the holder or stop it yourself.

use super::break_policy;
use crate::cli::BreakArgs;
use crate::config::Config;
use crate::context::require_initialized_workspace;
use crate::error::{BatonError, Result};
use crate::lock::{self, LockRecord};
use chrono::Duration;

/// Execute the `baton break` command.
pub fn cmd_break(args: BreakArgs) -> Result<()> {
    if !args.force {
        return Err(BatonError::UserError(
            "refusing to break the lock without --force.\n\n\
             Breaking a lock while its holder is active corrupts the workspace.\n\
             Only break locks whose holder has crashed or hung.\n\n\
             To proceed: baton break --force"
                .to_string(),
        ));
    }

    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    let record = lock::read_record(&ctx)?.ok_or_else(|| {
        BatonError::UserError("the workspace lock is free; nothing to break".to_string())
    })?;

    let verdict = lock::evaluate(
        &record,
        Duration::seconds(config.stale_threshold_secs as i64),
    );

    if !verdict.is_stale {
        return Err(BatonError::AlreadyHeld {
            holder: record.holder.to_string(),
            age_secs: verdict.heartbeat_age_secs,
        });
    }

    // --force authorizes evaluating the break; consent to actually break
    // comes from the policy (interactive prompt, or --yes).
    let policy = break_policy(true, args.yes);
    if !policy.confirm_break(&record, &verdict) {
        return Err(BatonError::StaleLockNeedsConfirmation {
            holder: record.holder.to_string(),
            age_secs: verdict.heartbeat_age_secs,
        });
    }

    lock::force_break(&ctx, &config, &record)?;

    println!("Broke stale lock held by {}.", record.holder);
    println!(
        "  Last heartbeat: {} ago",
        LockRecord::format_age(record.heartbeat_age())
    );
    println!("The workspace is free; acquire with `baton acquire <engine>`.");

    Ok(())
}
