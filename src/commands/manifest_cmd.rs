//! Implementation of the `baton manifest` subcommands.

use crate::cli::{ManifestAction, ManifestCommand};
use crate::context::require_initialized_workspace;
use crate::error::Result;
use crate::manifest;

/// Dispatch manifest subcommands.
pub fn dispatch_manifest(manifest_cmd: ManifestCommand) -> Result<()> {
    match manifest_cmd.action {
        ManifestAction::Show => cmd_manifest_show(),
    }
}

fn cmd_manifest_show() -> Result<()> {
    let ctx = require_initialized_workspace()?;

    let Some(manifest) = manifest::read_manifest(&ctx)? else {
        println!("No handover manifest has been written yet.");
        return Ok(());
    };

    println!("Handover manifest");
    println!("=================");
    println!();
    println!("Written:            {}", manifest.written_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("Workspace version:  {}", manifest.workspace_version);
    println!(
        "Previous holder:    {} (held {}s)",
        manifest.previous_holder.engine, manifest.previous_holder.held_for_secs
    );
    if !manifest.summary.is_empty() {
        println!("Summary:            {}", manifest.summary);
    }

    if !manifest.decisions_made.is_empty() {
        println!();
        println!("Decisions made:");
        for decision in &manifest.decisions_made {
            println!("  - {}", decision.decision);
            println!("    Rationale: {}", decision.rationale);
            for alternative in &decision.alternatives_considered {
                println!("    Considered: {}", alternative);
            }
        }
    }

    if !manifest.rejected_approaches.is_empty() {
        println!();
        println!("Rejected approaches:");
        for rejected in &manifest.rejected_approaches {
            let marker = if rejected.do_not_repropose {
                " [do not re-propose]"
            } else {
                ""
            };
            println!("  - {}{}", rejected.approach, marker);
            println!("    Reason: {}", rejected.reason);
        }
    }

    if !manifest.next_steps.is_empty() {
        println!();
        println!("Next steps:");
        for step in &manifest.next_steps {
            let marker = if step.requires_human_action {
                " [needs human]"
            } else {
                ""
            };
            println!("  - {}{}", step.description, marker);
        }
    }

    if !manifest.blocked_items.is_empty() {
        println!();
        println!("Blocked:");
        for item in &manifest.blocked_items {
            let marker = if item.requires_human_action {
                " [needs human]"
            } else {
                ""
            };
            println!("  - {}{}", item.description, marker);
        }
    }

    if !manifest.preferences_learned.is_empty() {
        println!();
        println!("Operator preferences:");
        for (key, value) in &manifest.preferences_learned {
            println!("  {}: {}", key, value);
        }
    }

    Ok(())
}
