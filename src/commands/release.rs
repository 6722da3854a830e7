//! Implementation of the `baton release` command.
//!
//! Runs two-phase termination with the standard commit steps:
//! `persist_workspace`, `notify_tracker`, `write_manifest`. The manifest
//! draft comes from `--manifest <file>`, or `.baton/handover-draft.yaml`
//! when present, or a minimal draft built from `--summary`.

use crate::cli::ReleaseArgs;
use crate::checkpoint::GitCheckpointer;
use crate::config::Config;
use crate::context::require_initialized_workspace;
use crate::error::{BatonError, Result};
use crate::lock::{self, LockToken};
use crate::manifest::ManifestDraft;
use crate::termination::{self, ReleaseOutcome};

/// Execute the `baton release` command.
pub fn cmd_release(args: ReleaseArgs) -> Result<()> {
    let ctx = require_initialized_workspace()?;
    let config = Config::load(ctx.config_path()).unwrap_or_default();

    let record = match lock::read_record(&ctx)? {
        Some(record) => record,
        None => {
            println!("Workspace lock already released.");
            return Ok(());
        }
    };

    if record.holder.engine != args.engine {
        return Err(BatonError::UserError(format!(
            "lock is held by {}, not by engine '{}'; refusing to release",
            record.holder, args.engine
        )));
    }
    let token = LockToken::for_holder(record.holder.clone(), record.acquired_at);

    let mut draft = load_draft(&ctx, &args)?;
    if draft.summary.is_empty()
        && let Some(summary) = &args.summary
    {
        draft.summary = summary.clone();
    }

    let checkpointer = GitCheckpointer::new(&ctx.workspace_root);
    let steps = termination::standard_steps(&ctx, &config, &token, draft);
    let outcome = termination::release(&ctx, &token, None, &checkpointer, steps)?;

    match outcome {
        ReleaseOutcome::Completed { checkpoint_ref } => {
            // The draft was folded into the manifest; a leftover would leak
            // into the next session's handover.
            let _ = std::fs::remove_file(ctx.manifest_draft_path());

            println!("Released workspace lock held by {}.", record.holder);
            println!("Workspace version: {}", checkpoint_ref);
            println!("Handover manifest written for the next engine.");
        }
        ReleaseOutcome::AlreadyReleased => {
            println!("Workspace lock already released.");
        }
    }

    Ok(())
}

fn load_draft(
    ctx: &crate::context::WorkspaceContext,
    args: &ReleaseArgs,
) -> Result<ManifestDraft> {
    if let Some(path) = &args.manifest {
        return ManifestDraft::load(path);
    }
    let draft_path = ctx.manifest_draft_path();
    if draft_path.exists() {
        return ManifestDraft::load(&draft_path);
    }
    Ok(ManifestDraft::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::cmd_init;
    use crate::context::WorkspaceContext;
    use crate::lock::{DenyBreak, acquire, read_record};
    use crate::manifest;
    use crate::test_support::{DirGuard, create_test_repo};
    use serial_test::serial;

    fn release_args(engine: &str) -> ReleaseArgs {
        ReleaseArgs {
            engine: engine.to_string(),
            summary: None,
            manifest: None,
        }
    }

    #[test]
    #[serial]
    fn release_frees_lock_and_writes_manifest() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        acquire(&ctx, &Config::default(), "gemini", None, &DenyBreak).unwrap();

        let mut args = release_args("gemini");
        args.summary = Some("session done".to_string());
        cmd_release(args).unwrap();

        assert!(read_record(&ctx).unwrap().is_none());
        let manifest = manifest::read_manifest(&ctx).unwrap().unwrap();
        assert_eq!(manifest.previous_holder.engine, "gemini");
        assert_eq!(manifest.summary, "session done");
    }

    #[test]
    #[serial]
    fn release_consumes_draft_file() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        acquire(&ctx, &Config::default(), "gemini", None, &DenyBreak).unwrap();

        std::fs::write(
            ctx.manifest_draft_path(),
            "summary: from the draft\ndecisions_made:\n- decision: keep sqlite\n  rationale: zero-ops\n",
        )
        .unwrap();

        cmd_release(release_args("gemini")).unwrap();

        let manifest = manifest::read_manifest(&ctx).unwrap().unwrap();
        assert_eq!(manifest.summary, "from the draft");
        assert_eq!(manifest.decisions_made[0].decision, "keep sqlite");
        assert!(!ctx.manifest_draft_path().exists());
    }

    #[test]
    #[serial]
    fn release_by_wrong_engine_fails() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        acquire(&ctx, &Config::default(), "gemini", None, &DenyBreak).unwrap();

        let err = cmd_release(release_args("claude")).unwrap_err();
        assert!(err.to_string().contains("refusing to release"));
        assert!(read_record(&ctx).unwrap().is_some());
    }

    #[test]
    #[serial]
    fn release_of_free_lock_is_idempotent() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        cmd_release(release_args("gemini")).unwrap();
        cmd_release(release_args("gemini")).unwrap();
    }
}
