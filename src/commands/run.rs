//! Implementation of the `baton run` command.
//!
//! The full session wrapper: acquire the lock with this process recorded
//! for liveness, surface the previous holder's handover, start the
//! heartbeat monitor, execute the engine command, then release through
//! two-phase termination with the standard commit steps.
//!
//! The lock is released even when the engine command fails: the session
//! is over either way, and a stranded `active` record would only force the
//! next engine through the stale-break path. The engine's failure is
//! reported after the handover completes.

use super::{break_policy, print_handover_highlights};
use crate::checkpoint::GitCheckpointer;
use crate::cli::RunArgs;
use crate::config::Config;
use crate::context::{WorkspaceContext, require_initialized_workspace};
use crate::error::{BatonError, Result};
use crate::heartbeat::HeartbeatMonitor;
use crate::lock;
use crate::manifest::ManifestDraft;
use crate::termination::{self, ReleaseOutcome};
use std::time::Duration;

/// Execute the `baton run` command.
pub fn cmd_run(args: RunArgs) -> Result<()> {
    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    let policy = break_policy(args.break_stale, args.yes);
    let token = lock::acquire(
        &ctx,
        &config,
        &args.engine,
        Some(std::process::id()),
        policy.as_ref(),
    )?;

    println!("Acquired workspace lock as {}.", token.holder);
    println!();
    print_handover_highlights(&ctx)?;
    println!();

    let monitor = HeartbeatMonitor::start(
        ctx.clone(),
        token.clone(),
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    let engine_result = run_engine_command(&ctx, &args.command);

    let draft = if ctx.manifest_draft_path().exists() {
        ManifestDraft::load(ctx.manifest_draft_path())?
    } else {
        ManifestDraft::default()
    };

    let checkpointer = GitCheckpointer::new(&ctx.workspace_root);
    let steps = termination::standard_steps(&ctx, &config, &token, draft);
    let outcome = termination::release(&ctx, &token, Some(monitor), &checkpointer, steps)?;

    if let ReleaseOutcome::Completed { checkpoint_ref } = outcome {
        let _ = std::fs::remove_file(ctx.manifest_draft_path());
        println!();
        println!("Released workspace lock (workspace version {}).", checkpoint_ref);
    }

    engine_result
}

fn run_engine_command(ctx: &WorkspaceContext, command: &[String]) -> Result<()> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| BatonError::UserError("no engine command given".to_string()))?;

    let status = std::process::Command::new(program)
        .args(rest)
        .current_dir(&ctx.workspace_root)
        .status()
        .map_err(|e| {
            BatonError::UserError(format!("failed to run engine command '{}': {}", program, e))
        })?;

    if !status.success() {
        return Err(BatonError::UserError(format!(
            "engine command '{}' exited with {}",
            program,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}
