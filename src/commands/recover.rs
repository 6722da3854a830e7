//! Implementation of the `baton recover` command.
//!
//! Resolves a `terminating`/`failed_<k>` record left by an interrupted
//! release. The three resolutions are the only ways such a record may be
//! cleared; it is never discarded silently.

use crate::checkpoint::GitCheckpointer;
use crate::cli::RecoverArgs;
use crate::context::require_initialized_workspace;
use crate::error::{BatonError, Result};
use crate::termination::{self, RecoveryResolution};

/// Execute the `baton recover` command.
pub fn cmd_recover(args: RecoverArgs) -> Result<()> {
    let resolution = match args.resolution.as_str() {
        "recover" => RecoveryResolution::Recover,
        "rollback" => RecoveryResolution::Rollback,
        "abort" => RecoveryResolution::Abort,
        other => {
            return Err(BatonError::UserError(format!(
                "unknown resolution '{}': expected recover, rollback, or abort",
                other
            )));
        }
    };

    let ctx = require_initialized_workspace()?;
    let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

    let report = termination::recover(&ctx, &checkpointer, resolution)?;

    println!(
        "Found '{}' record left by {}.",
        report.status, report.holder
    );
    match resolution {
        RecoveryResolution::Recover => {
            println!("Workspace verified; the record was cleared.");
            println!("The next engine continues from the current workspace state.");
        }
        RecoveryResolution::Rollback => {
            println!(
                "Workspace restored to checkpoint {}.",
                report.checkpoint_ref.as_deref().unwrap_or("unknown")
            );
            println!("The record was cleared.");
        }
        RecoveryResolution::Abort => {
            println!("Left untouched for manual intervention.");
            println!("The workspace cannot be acquired until the record is resolved.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init::cmd_init;
    use crate::config::Config;
    use crate::context::WorkspaceContext;
    use crate::error::BatonError;
    use crate::lock::{DenyBreak, LockStatus, acquire, read_record};
    use crate::termination::TerminationStep;
    use crate::test_support::{DirGuard, create_test_repo};
    use serial_test::serial;

    fn plant_failed_record(ctx: &WorkspaceContext) {
        let token = acquire(ctx, &Config::default(), "gemini", None, &DenyBreak).unwrap();
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);
        let steps = vec![TerminationStep::new("persist_workspace", || {
            Err(BatonError::UserError("boom".to_string()))
        })];
        termination::release(ctx, &token, None, &checkpointer, steps).unwrap_err();
    }

    #[test]
    #[serial]
    fn recover_clears_failed_record() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        plant_failed_record(&ctx);

        cmd_recover(RecoverArgs {
            resolution: "recover".to_string(),
        })
        .unwrap();

        assert!(read_record(&ctx).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn abort_preserves_record() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let ctx = WorkspaceContext::resolve_from(temp_dir.path()).unwrap();
        plant_failed_record(&ctx);

        cmd_recover(RecoverArgs {
            resolution: "abort".to_string(),
        })
        .unwrap();

        assert_eq!(
            read_record(&ctx).unwrap().unwrap().status,
            LockStatus::Failed(1)
        );
    }

    #[test]
    #[serial]
    fn unknown_resolution_is_rejected() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let err = cmd_recover(RecoverArgs {
            resolution: "yolo".to_string(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("unknown resolution"));
    }

    #[test]
    #[serial]
    fn recover_with_nothing_pending_fails() {
        let temp_dir = create_test_repo();
        let _guard = DirGuard::new(temp_dir.path());
        cmd_init().unwrap();

        let err = cmd_recover(RecoverArgs {
            resolution: "recover".to_string(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("nothing to recover"));
    }
}
