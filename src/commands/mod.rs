//! Command implementations for baton.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus small helpers shared between commands.

mod acquire;
mod break_lock;
mod heartbeat;
mod init;
mod manifest_cmd;
mod recover;
mod release;
mod resource_cmd;
mod run;
mod status;

use crate::cli::Command;
use crate::context::WorkspaceContext;
use crate::error::Result;
use crate::lock::{AllowBreak, BreakPolicy, DenyBreak, PromptBreak};
use crate::manifest;

/// Dispatch a command to its implementation.
pub fn dispatch(command: Command) -> Result<()> {
    match command {
        Command::Init => init::cmd_init(),
        Command::Acquire(args) => acquire::cmd_acquire(args),
        Command::Heartbeat(args) => heartbeat::cmd_heartbeat(args),
        Command::Release(args) => release::cmd_release(args),
        Command::Status => status::cmd_status(),
        Command::Break(args) => break_lock::cmd_break(args),
        Command::Recover(args) => recover::cmd_recover(args),
        Command::Resource(resource_cmd) => resource_cmd::dispatch_resource(resource_cmd),
        Command::Manifest(manifest_cmd) => manifest_cmd::dispatch_manifest(manifest_cmd),
        Command::Run(args) => run::cmd_run(args),
    }
}

/// Select the break-confirmation policy from the consent flags.
///
/// Without `--break-stale` staleness is only reported, never acted on.
/// `--yes` is the non-interactive (policy-gated) consent; otherwise a
/// human is prompted.
pub(crate) fn break_policy(break_stale: bool, yes: bool) -> Box<dyn BreakPolicy> {
    if !break_stale {
        Box::new(DenyBreak)
    } else if yes {
        Box::new(AllowBreak)
    } else {
        Box::new(PromptBreak)
    }
}

/// Print the surviving handover context for a freshly acquired session.
///
/// Surfaces what the incoming engine must not lose: approaches flagged
/// never to re-propose, the step queue, and blocked items awaiting a human.
pub(crate) fn print_handover_highlights(ctx: &WorkspaceContext) -> Result<()> {
    let Some(manifest) = manifest::read_manifest(ctx)? else {
        println!("No handover manifest from a previous session.");
        return Ok(());
    };

    println!(
        "Handover from {} (held {}s, workspace {}):",
        manifest.previous_holder.engine,
        manifest.previous_holder.held_for_secs,
        manifest.workspace_version
    );
    if !manifest.summary.is_empty() {
        println!("  Summary: {}", manifest.summary);
    }

    let barred: Vec<_> = manifest
        .rejected_approaches
        .iter()
        .filter(|r| r.do_not_repropose)
        .collect();
    if !barred.is_empty() {
        println!("  Do not re-propose:");
        for rejected in barred {
            println!("    - {} ({})", rejected.approach, rejected.reason);
        }
    }

    if !manifest.next_steps.is_empty() {
        println!("  Next steps:");
        for step in &manifest.next_steps {
            let marker = if step.requires_human_action {
                " [needs human]"
            } else {
                ""
            };
            println!("    - {}{}", step.description, marker);
        }
    }

    if !manifest.blocked_items.is_empty() {
        println!("  Blocked:");
        for item in &manifest.blocked_items {
            let marker = if item.requires_human_action {
                " [needs human]"
            } else {
                ""
            };
            println!("    - {}{}", item.description, marker);
        }
    }

    Ok(())
}
