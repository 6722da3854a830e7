//! Implementation of the `baton heartbeat` command.
//!
//! Manual heartbeat path for engines that do not run the background
//! monitor (detached holders driven through the CLI).

use crate::cli::HeartbeatArgs;
use crate::context::require_initialized_workspace;
use crate::error::{BatonError, Result};
use crate::lock::{self, LockToken};

/// Execute the `baton heartbeat` command.
pub fn cmd_heartbeat(args: HeartbeatArgs) -> Result<()> {
    let ctx = require_initialized_workspace()?;

    let record = lock::read_record(&ctx)?.ok_or_else(|| {
        BatonError::UserError("the workspace lock is free; nothing to heartbeat".to_string())
    })?;

    if record.holder.engine != args.engine {
        return Err(BatonError::UserError(format!(
            "lock is held by {}, not by engine '{}'",
            record.holder, args.engine
        )));
    }

    let token = LockToken::for_holder(record.holder.clone(), record.acquired_at);
    lock::heartbeat(&ctx, &token)?;

    println!("Heartbeat written for {}.", record.holder);
    Ok(())
}
