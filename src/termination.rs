//! Two-phase termination coordinator and the recovery path.
//!
//! Release is prepare -> commit -> finalize, with each phase's failure
//! halting at a diagnosable terminal state rather than retrying silently:
//!
//! 1. **Prepare**: the heartbeat monitor is stopped (before anything else,
//!    so no heartbeat write can race the record's removal), a workspace
//!    checkpoint is taken, and the record moves to `terminating` carrying
//!    the checkpoint reference.
//! 2. **Commit**: the caller-supplied ordered list of named steps runs.
//!    Step *k* (1-based) failing persists `failed_<k>` and stops; later
//!    steps are not attempted.
//! 3. **Finalize**: only reached when every step succeeded; the record
//!    moves to `completed` and is then removed.
//!
//! An interrupted commit leaves the inspectable `failed_<k>` record; the
//! next acquirer resolves it through `recover` with one of exactly three
//! resolutions (recover / rollback / abort). A `failed_*` record is never
//! discarded without one of these explicit resolutions.

use crate::audit::{self, AuditEntry, AuditEvent};
use crate::checkpoint::Checkpointer;
use crate::config::Config;
use crate::context::WorkspaceContext;
use crate::error::{BatonError, Result};
use crate::heartbeat::HeartbeatMonitor;
use crate::lock::{self, LockStatus, LockToken};
use serde_json::json;

/// One named, independently failable commit step.
///
/// Steps are heterogeneous (workspace persistence, external notification,
/// manifest write, ...) and caller-supplied, so new steps slot in without
/// changing the phase machine.
pub struct TerminationStep<'a> {
    name: String,
    run: Box<dyn FnOnce() -> Result<()> + 'a>,
}

impl<'a> TerminationStep<'a> {
    pub fn new(name: impl Into<String>, run: impl FnOnce() -> Result<()> + 'a) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
        }
    }

    /// The step's name as it appears in audit entries and errors.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of a release call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Termination ran to completion; the workspace is free.
    Completed {
        /// The checkpoint reference recorded during prepare.
        checkpoint_ref: String,
    },
    /// The record was already gone. No phase ran, nothing was audited.
    AlreadyReleased,
}

/// Run the two-phase termination protocol for `token`.
///
/// `monitor` is the holder's heartbeat monitor, stopped before the prepare
/// phase. Idempotent: releasing an already-released lock returns
/// `AlreadyReleased` without touching the audit log.
pub fn release(
    ctx: &WorkspaceContext,
    token: &LockToken,
    monitor: Option<HeartbeatMonitor>,
    checkpointer: &dyn Checkpointer,
    steps: Vec<TerminationStep<'_>>,
) -> Result<ReleaseOutcome> {
    // Stopping the monitor must precede every other action, even the
    // existence check: a live monitor could otherwise write a heartbeat
    // between our phases.
    if let Some(monitor) = monitor {
        monitor.stop();
    }

    let mut record = match lock::read_record(ctx)? {
        Some(record) => record,
        None => return Ok(ReleaseOutcome::AlreadyReleased),
    };

    if record.holder != token.holder {
        return Err(BatonError::UserError(format!(
            "lock is held by {}, not by {}; refusing to release",
            record.holder, token.holder
        )));
    }

    if record.status != LockStatus::Active {
        return Err(BatonError::PendingRecovery {
            status: record.status.to_string(),
            holder: record.holder.to_string(),
        });
    }

    // Prepare: checkpoint, then move to terminating. A checkpoint failure
    // aborts before the record's terminal state is touched.
    let checkpoint_ref = checkpointer
        .checkpoint(&format!(
            "baton: workspace checkpoint before {} hands over",
            record.holder.engine
        ))
        .map_err(|e| BatonError::PrepareFailed(e.to_string()))?;

    record.status = LockStatus::Terminating;
    record.checkpoint_ref = Some(checkpoint_ref.clone());
    lock::write_record(ctx, &record)?;

    let entry = AuditEntry::new(AuditEvent::PhaseChange, record.holder.to_string())
        .with_details(json!({"phase": "terminating", "checkpoint_ref": checkpoint_ref}));
    audit::append_entry(ctx, &entry)?;

    // Commit: ordered, attributable, halt at the first failure.
    for (index, step) in steps.into_iter().enumerate() {
        let step_number = index + 1;
        let name = step.name().to_string();
        if let Err(e) = (step.run)() {
            record.status = LockStatus::Failed(step_number);
            lock::write_record(ctx, &record)?;

            let entry = AuditEntry::new(AuditEvent::PhaseChange, record.holder.to_string())
                .with_details(json!({
                    "phase": record.status.to_string(),
                    "step": name,
                    "error": e.to_string(),
                }));
            audit::append_entry(ctx, &entry)?;

            return Err(BatonError::CommitStepFailed {
                step: step_number,
                name,
                detail: e.to_string(),
            });
        }
    }

    // Finalize: completed, then gone.
    record.status = LockStatus::Completed;
    lock::write_record(ctx, &record)?;
    lock::remove_record(ctx)?;

    let entry = AuditEntry::new(AuditEvent::Release, record.holder.to_string()).with_details(
        json!({
            "held_for_secs": record.held_for().num_seconds(),
            "checkpoint_ref": checkpoint_ref,
        }),
    );
    audit::append_entry(ctx, &entry)?;

    Ok(ReleaseOutcome::Completed { checkpoint_ref })
}

/// The standard commit steps used by the CLI release sequence:
/// `persist_workspace`, `notify_tracker`, `write_manifest`.
///
/// The manifest write is deliberately last: a crash before it leaves the
/// outgoing holder's context reconstructable from the checkpoint instead of
/// silently lost.
pub fn standard_steps<'a>(
    ctx: &'a WorkspaceContext,
    config: &'a Config,
    token: &'a LockToken,
    draft: crate::manifest::ManifestDraft,
) -> Vec<TerminationStep<'a>> {
    vec![
        TerminationStep::new("persist_workspace", move || {
            if !config.persist_workspace {
                return Ok(());
            }
            if crate::git::is_dirty(&ctx.workspace_root)? {
                crate::git::commit_all(
                    &ctx.workspace_root,
                    &format!("baton: persist workspace changes ({})", token.holder.engine),
                )?;
            }
            Ok(())
        }),
        TerminationStep::new("notify_tracker", move || {
            run_tracker_command(ctx, config, &token.holder.engine)
        }),
        TerminationStep::new("write_manifest", move || {
            let record = lock::read_record(ctx)?.ok_or_else(|| {
                BatonError::UserError("lock record vanished during termination".to_string())
            })?;
            let workspace_version = record
                .checkpoint_ref
                .clone()
                .unwrap_or_else(|| "unknown".to_string());

            let manifest = draft.into_manifest(
                workspace_version,
                crate::manifest::PreviousHolder {
                    engine: token.holder.engine.clone(),
                    held_for_secs: record.held_for().num_seconds().max(0) as u64,
                },
            );
            crate::manifest::write_manifest(ctx, &manifest)
        }),
    ]
}

/// Run the configured external task-tracker command, if any.
fn run_tracker_command(ctx: &WorkspaceContext, config: &Config, engine: &str) -> Result<()> {
    if config.tracker_command.trim().is_empty() {
        return Ok(());
    }

    let words = shell_words::split(&config.tracker_command).map_err(|e| {
        BatonError::UserError(format!(
            "invalid tracker_command '{}': {}",
            config.tracker_command, e
        ))
    })?;
    let (program, args) = words
        .split_first()
        .ok_or_else(|| BatonError::UserError("tracker_command is empty".to_string()))?;

    let status = std::process::Command::new(program)
        .args(args)
        .current_dir(&ctx.workspace_root)
        .env("BATON_ENGINE", engine)
        .status()
        .map_err(|e| {
            BatonError::UserError(format!("failed to run tracker command '{}': {}", program, e))
        })?;

    if !status.success() {
        return Err(BatonError::UserError(format!(
            "tracker command '{}' exited with {}",
            config.tracker_command,
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

/// The three explicit resolutions for a terminal (`terminating`/`failed_*`)
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryResolution {
    /// Verify workspace consistency and clear the record; the next acquirer
    /// continues from the current workspace state.
    Recover,
    /// Restore the recorded checkpoint, then clear the record.
    Rollback,
    /// Leave everything untouched pending manual intervention.
    Abort,
}

impl RecoveryResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryResolution::Recover => "recover",
            RecoveryResolution::Rollback => "rollback",
            RecoveryResolution::Abort => "abort",
        }
    }
}

/// What a recovery call found and did.
#[derive(Debug)]
pub struct RecoveryReport {
    /// The terminal status that was found.
    pub status: String,

    /// The previous holder's identity.
    pub holder: String,

    /// The checkpoint reference, if prepare recorded one.
    pub checkpoint_ref: Option<String>,

    /// Whether the record was cleared (false for abort).
    pub cleared: bool,
}

/// Resolve a terminal record left by an interrupted termination.
pub fn recover(
    ctx: &WorkspaceContext,
    checkpointer: &dyn Checkpointer,
    resolution: RecoveryResolution,
) -> Result<RecoveryReport> {
    let record = lock::read_record(ctx)?.ok_or_else(|| {
        BatonError::UserError("no lock record exists; nothing to recover".to_string())
    })?;

    if !record.status.needs_recovery() {
        return Err(BatonError::UserError(format!(
            "lock record is '{}'; recovery only applies to terminating/failed records",
            record.status
        )));
    }

    let mut report = RecoveryReport {
        status: record.status.to_string(),
        holder: record.holder.to_string(),
        checkpoint_ref: record.checkpoint_ref.clone(),
        cleared: false,
    };

    match resolution {
        RecoveryResolution::Abort => {}
        RecoveryResolution::Recover => {
            // Consistency check: the workspace must be readable, and a
            // recorded checkpoint must still exist so rollback remains
            // possible later if the continued session goes wrong.
            crate::git::is_dirty(&ctx.workspace_root)?;
            if let Some(reference) = &record.checkpoint_ref
                && !checkpointer.exists(reference)
            {
                return Err(BatonError::CheckpointMissing);
            }
            lock::remove_record(ctx)?;
            report.cleared = true;
        }
        RecoveryResolution::Rollback => {
            let reference = record
                .checkpoint_ref
                .as_deref()
                .ok_or(BatonError::CheckpointMissing)?;
            checkpointer.restore(reference)?;
            lock::remove_record(ctx)?;
            report.cleared = true;
        }
    }

    let entry = AuditEntry::new(AuditEvent::Recover, record.holder.to_string()).with_details(
        json!({
            "resolution": resolution.as_str(),
            "status": report.status,
            "checkpoint_ref": report.checkpoint_ref,
            "cleared": report.cleared,
        }),
    );
    audit::append_entry(ctx, &entry)?;

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEvent;
    use crate::checkpoint::GitCheckpointer;
    use crate::git;
    use crate::lock::{DenyBreak, acquire, read_record};
    use crate::manifest::{self, ManifestDraft};
    use crate::test_support::create_initialized_workspace;
    use std::cell::Cell;

    struct FailingCheckpointer;

    impl Checkpointer for FailingCheckpointer {
        fn checkpoint(&self, _label: &str) -> Result<String> {
            Err(BatonError::GitError("disk full".to_string()))
        }
        fn restore(&self, _reference: &str) -> Result<()> {
            Err(BatonError::RollbackFailed("disk full".to_string()))
        }
        fn exists(&self, _reference: &str) -> bool {
            false
        }
    }

    fn acquire_for_test(ctx: &WorkspaceContext, engine: &str) -> LockToken {
        acquire(ctx, &Config::default(), engine, None, &DenyBreak).unwrap()
    }

    fn ok_step(name: &str) -> TerminationStep<'static> {
        TerminationStep::new(name, || Ok(()))
    }

    #[test]
    fn full_release_removes_record_and_audits() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let outcome = release(
            &ctx,
            &token,
            None,
            &checkpointer,
            vec![ok_step("persist_workspace"), ok_step("notify_external")],
        )
        .unwrap();

        match outcome {
            ReleaseOutcome::Completed { checkpoint_ref } => {
                assert_eq!(checkpoint_ref.len(), 40);
            }
            ReleaseOutcome::AlreadyReleased => panic!("expected completed"),
        }
        assert!(read_record(&ctx).unwrap().is_none());

        let events: Vec<_> = crate::audit::tail(&ctx, 20)
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert!(events.contains(&AuditEvent::PhaseChange));
        assert!(events.contains(&AuditEvent::Release));
    }

    #[test]
    fn release_is_idempotent_without_duplicate_audit_entries() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        release(&ctx, &token, None, &checkpointer, vec![]).unwrap();
        let audit_len = crate::audit::tail(&ctx, 100).unwrap().len();

        for _ in 0..2 {
            let outcome = release(&ctx, &token, None, &checkpointer, vec![]).unwrap();
            assert_eq!(outcome, ReleaseOutcome::AlreadyReleased);
        }
        assert_eq!(crate::audit::tail(&ctx, 100).unwrap().len(), audit_len);
    }

    #[test]
    fn release_rejects_non_holder_token() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let _token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let intruder = LockToken::for_holder(
            crate::lock::HolderId::detached("claude"),
            chrono::Utc::now(),
        );
        let err = release(&ctx, &intruder, None, &checkpointer, vec![]).unwrap_err();
        assert!(err.to_string().contains("refusing to release"));

        // The record is untouched.
        assert_eq!(
            read_record(&ctx).unwrap().unwrap().status,
            LockStatus::Active
        );
    }

    #[test]
    fn prepare_failure_leaves_record_active() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");

        let err = release(&ctx, &token, None, &FailingCheckpointer, vec![]).unwrap_err();
        assert!(matches!(err, BatonError::PrepareFailed(_)));

        let record = read_record(&ctx).unwrap().unwrap();
        assert_eq!(record.status, LockStatus::Active);
        assert!(record.checkpoint_ref.is_none());
    }

    #[test]
    fn failed_step_halts_and_persists_failed_index() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let third_ran = Cell::new(false);
        let steps = vec![
            ok_step("persist_workspace"),
            TerminationStep::new("notify_external", || {
                Err(BatonError::UserError("tracker unreachable".to_string()))
            }),
            TerminationStep::new("write_manifest", || {
                third_ran.set(true);
                Ok(())
            }),
        ];

        let err = release(&ctx, &token, None, &checkpointer, steps).unwrap_err();
        match err {
            BatonError::CommitStepFailed { step, name, .. } => {
                assert_eq!(step, 2);
                assert_eq!(name, "notify_external");
            }
            other => panic!("expected CommitStepFailed, got {:?}", other),
        }
        assert!(!third_ran.get(), "steps after the failure must not run");

        let record = read_record(&ctx).unwrap().unwrap();
        assert_eq!(record.status, LockStatus::Failed(2));
        assert!(record.checkpoint_ref.is_some());
    }

    #[test]
    fn rollback_restores_pre_termination_checkpoint() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        // Workspace content that the checkpoint must capture.
        std::fs::write(ctx.workspace_root.join("work.txt"), "session output\n").unwrap();

        let steps = vec![
            TerminationStep::new("persist_workspace", || Ok(())),
            TerminationStep::new("notify_external", || {
                // Damage the workspace, then fail: rollback must undo this.
                std::fs::write(ctx.workspace_root.join("work.txt"), "corrupted\n").unwrap();
                Err(BatonError::UserError("tracker unreachable".to_string()))
            }),
            TerminationStep::new("write_manifest", || Ok(())),
        ];
        release(&ctx, &token, None, &checkpointer, steps).unwrap_err();

        let checkpoint_ref = read_record(&ctx)
            .unwrap()
            .unwrap()
            .checkpoint_ref
            .clone()
            .unwrap();

        let report = recover(&ctx, &checkpointer, RecoveryResolution::Rollback).unwrap();
        assert!(report.cleared);
        assert_eq!(report.status, "failed_2");

        assert_eq!(
            std::fs::read_to_string(ctx.workspace_root.join("work.txt")).unwrap(),
            "session output\n"
        );
        assert_eq!(git::head_commit(&ctx.workspace_root).unwrap(), checkpoint_ref);
        assert!(read_record(&ctx).unwrap().is_none());
    }

    #[test]
    fn recover_resolution_clears_record_without_rollback() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let steps = vec![TerminationStep::new("persist_workspace", || {
            Err(BatonError::UserError("boom".to_string()))
        })];
        release(&ctx, &token, None, &checkpointer, steps).unwrap_err();

        let report = recover(&ctx, &checkpointer, RecoveryResolution::Recover).unwrap();
        assert!(report.cleared);
        assert!(read_record(&ctx).unwrap().is_none());

        // The resolution is audited.
        let last = crate::audit::tail(&ctx, 1).unwrap().pop().unwrap();
        assert_eq!(last.event, AuditEvent::Recover);
        assert_eq!(last.details["resolution"], "recover");
    }

    #[test]
    fn abort_leaves_record_in_place() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        release(
            &ctx,
            &token,
            None,
            &checkpointer,
            vec![TerminationStep::new("persist_workspace", || {
                Err(BatonError::UserError("boom".to_string()))
            })],
        )
        .unwrap_err();

        let report = recover(&ctx, &checkpointer, RecoveryResolution::Abort).unwrap();
        assert!(!report.cleared);
        assert_eq!(
            read_record(&ctx).unwrap().unwrap().status,
            LockStatus::Failed(1)
        );
    }

    #[test]
    fn rollback_without_checkpoint_is_checkpoint_missing() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        // Hand-craft a failed record with no checkpoint reference.
        let mut record = crate::lock::LockRecord::new(crate::lock::HolderId::detached("gemini"));
        record.status = LockStatus::Failed(1);
        crate::lock::write_record(&ctx, &record).unwrap();

        let err = recover(&ctx, &checkpointer, RecoveryResolution::Rollback).unwrap_err();
        assert!(matches!(err, BatonError::CheckpointMissing));
    }

    #[test]
    fn recover_on_active_record_is_rejected() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let _token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let err = recover(&ctx, &checkpointer, RecoveryResolution::Recover).unwrap_err();
        assert!(err.to_string().contains("recovery only applies"));
    }

    #[test]
    fn standard_steps_write_manifest_with_checkpoint_version() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let config = Config::default();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let draft: ManifestDraft =
            serde_yaml::from_str("summary: finished the cache layer\n").unwrap();
        let steps = standard_steps(&ctx, &config, &token, draft);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].name(), "persist_workspace");
        assert_eq!(steps[1].name(), "notify_tracker");
        assert_eq!(steps[2].name(), "write_manifest");

        let outcome = release(&ctx, &token, None, &checkpointer, steps).unwrap();
        let checkpoint_ref = match outcome {
            ReleaseOutcome::Completed { checkpoint_ref } => checkpoint_ref,
            ReleaseOutcome::AlreadyReleased => panic!("expected completed"),
        };

        let manifest = manifest::read_manifest(&ctx).unwrap().unwrap();
        assert_eq!(manifest.workspace_version, checkpoint_ref);
        assert_eq!(manifest.previous_holder.engine, "gemini");
        assert_eq!(manifest.summary, "finished the cache layer");
    }

    #[test]
    fn failing_tracker_command_fails_step_two() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let mut config = Config::default();
        config.tracker_command = "false".to_string();
        let token = acquire_for_test(&ctx, "gemini");
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        let steps = standard_steps(&ctx, &config, &token, ManifestDraft::default());
        let err = release(&ctx, &token, None, &checkpointer, steps).unwrap_err();

        match err {
            BatonError::CommitStepFailed { step, name, .. } => {
                assert_eq!(step, 2);
                assert_eq!(name, "notify_tracker");
            }
            other => panic!("expected CommitStepFailed, got {:?}", other),
        }
        assert_eq!(
            read_record(&ctx).unwrap().unwrap().status,
            LockStatus::Failed(2)
        );
        // No manifest was written: the failure preceded the manifest step.
        assert!(manifest::read_manifest(&ctx).unwrap().is_none());
    }

    #[test]
    fn handover_scenario_between_two_engines() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        let config = Config::default();
        let checkpointer = GitCheckpointer::new(&ctx.workspace_root);

        // gemini's session: acquire, work, release with standard steps.
        let gemini = acquire_for_test(&ctx, "gemini");
        std::fs::write(ctx.workspace_root.join("feature.rs"), "// done\n").unwrap();

        let draft: ManifestDraft = serde_yaml::from_str(
            "summary: feature landed\n\
             next_steps:\n\
             - description: wire up CI\n",
        )
        .unwrap();
        let steps = standard_steps(&ctx, &config, &gemini, draft);
        release(&ctx, &gemini, None, &checkpointer, steps).unwrap();
        assert!(read_record(&ctx).unwrap().is_none());

        // claude acquires immediately and reads gemini's context.
        let claude = acquire(&ctx, &config, "claude", None, &DenyBreak).unwrap();
        assert_eq!(claude.holder.engine, "claude");

        let manifest = manifest::read_manifest(&ctx).unwrap().unwrap();
        assert_eq!(manifest.previous_holder.engine, "gemini");
        assert_eq!(manifest.next_steps[0].description, "wire up CI");
    }
}
