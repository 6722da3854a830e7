//! Lock manager operations: acquire, heartbeat, force-break, status.
//!
//! Acquisition is a single indivisible create-if-absent filesystem
//! operation (`create_new`): under concurrent callers exactly one succeeds
//! and the rest observe the created record. Release lives in the
//! termination module; this module only exposes the raw record
//! read/write/remove primitives it builds on.

use super::record::{HolderId, LockRecord, LockStatus};
use super::stale::{self, BreakPolicy};
use super::token::LockToken;
use crate::audit::{self, AuditEntry, AuditEvent};
use crate::config::Config;
use crate::context::WorkspaceContext;
use crate::error::{BatonError, Result};
use crate::fs::atomic_write_file;
use crate::process;
use chrono::Duration;
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;

/// Observable state of the global lock.
#[derive(Debug)]
pub enum LockState {
    /// No record exists; the workspace is free.
    Free,
    /// A record exists.
    Held {
        record: LockRecord,
        /// Whether the stale detector would report it stale right now.
        stale: bool,
    },
}

/// Acquire the global exclusivity lock for `engine_id`.
///
/// `pid` is the coordinating process to record for liveness checks, or
/// `None` for a detached holder. If an existing record is found, the
/// stale-lock detector is consulted; a confirmed-stale lock is broken via
/// `policy` and the exclusive create is retried exactly once.
///
/// A declined break leaves no partial acquisition artifacts: the only
/// mutation on that path is the read of the existing record.
pub fn acquire(
    ctx: &WorkspaceContext,
    config: &Config,
    engine_id: &str,
    pid: Option<u32>,
    policy: &dyn BreakPolicy,
) -> Result<LockToken> {
    let holder = match pid {
        Some(p) => HolderId::with_pid(engine_id, p),
        None => HolderId::detached(engine_id),
    };

    if let Some(token) = try_exclusive_create(ctx, &holder, json!({}))? {
        return Ok(token);
    }

    let existing = match read_record_settled(ctx)? {
        Some(record) => record,
        // The holder released between our create attempt and this read;
        // take the freed slot.
        None => {
            return try_exclusive_create(ctx, &holder, json!({}))?.ok_or_else(|| {
                BatonError::UserError(
                    "lock state changed concurrently during acquisition; retry".to_string(),
                )
            });
        }
    };

    match existing.status {
        LockStatus::Active => {}
        LockStatus::Completed => {
            // Every commit step succeeded and only the final record removal
            // was interrupted. Completing that removal is the one terminal
            // state safe to resolve without an explicit recovery decision.
            remove_record(ctx)?;
            let entry = AuditEntry::new(AuditEvent::Release, existing.holder.to_string())
                .with_details(json!({"completed_interrupted_finalize": true}));
            audit::append_entry(ctx, &entry)?;

            return try_exclusive_create(ctx, &holder, json!({}))?.ok_or_else(|| {
                BatonError::UserError(
                    "lock state changed concurrently during acquisition; retry".to_string(),
                )
            });
        }
        LockStatus::Terminating | LockStatus::Failed(_) => {
            return Err(BatonError::PendingRecovery {
                status: existing.status.to_string(),
                holder: existing.holder.to_string(),
            });
        }
    }

    let verdict = stale::evaluate(
        &existing,
        Duration::seconds(config.stale_threshold_secs as i64),
    );

    if !verdict.is_stale {
        return Err(BatonError::AlreadyHeld {
            holder: existing.holder.to_string(),
            age_secs: verdict.heartbeat_age_secs,
        });
    }

    if !policy.confirm_break(&existing, &verdict) {
        return Err(BatonError::StaleLockNeedsConfirmation {
            holder: existing.holder.to_string(),
            age_secs: verdict.heartbeat_age_secs,
        });
    }

    force_break(ctx, config, &existing)?;

    // Retry the exclusive create exactly once; another engine may win the
    // post-break race, in which case its identity is reported.
    let details = json!({
        "after_force_break": true,
        "previous_holder": existing.holder.to_string(),
    });
    match try_exclusive_create(ctx, &holder, details)? {
        Some(token) => Ok(token),
        None => {
            let winner = read_record(ctx)?;
            Err(BatonError::AlreadyHeld {
                holder: winner
                    .as_ref()
                    .map(|r| r.holder.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                age_secs: winner.map(|r| r.heartbeat_age().num_seconds()).unwrap_or(0),
            })
        }
    }
}

/// Attempt the indivisible create-if-absent of the lock record.
///
/// Returns `Ok(None)` when a record already exists. On success the acquire
/// audit entry is appended and a token returned.
fn try_exclusive_create(
    ctx: &WorkspaceContext,
    holder: &HolderId,
    details: serde_json::Value,
) -> Result<Option<LockToken>> {
    let record = LockRecord::new(holder.clone());
    let path = ctx.lock_record_path();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            BatonError::UserError(format!(
                "failed to create state directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => {
            return Err(BatonError::UserError(format!(
                "failed to create lock record '{}': {}",
                path.display(),
                e
            )));
        }
    };

    let content = record.to_json()?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            // Never leave a half-written record claiming the lock.
            let _ = std::fs::remove_file(&path);
            BatonError::UserError(format!("failed to write lock record: {}", e))
        })?;

    let mut entry_details = details;
    if let Some(map) = entry_details.as_object_mut() {
        map.insert("engine".to_string(), json!(holder.engine));
        if let Some(pid) = holder.pid {
            map.insert("pid".to_string(), json!(pid));
        }
    }
    let entry =
        AuditEntry::new(AuditEvent::Acquire, holder.to_string()).with_details(entry_details);
    audit::append_entry(ctx, &entry)?;

    Ok(Some(LockToken::new(holder.clone(), record.acquired_at)))
}

/// Write a heartbeat into the lock record on behalf of `token`.
///
/// Fails if the record is gone, held by a different identity, or no longer
/// active. A heartbeat must never resurrect or overwrite a successor's
/// lock.
pub fn heartbeat(ctx: &WorkspaceContext, token: &LockToken) -> Result<()> {
    let mut record = read_record(ctx)?.ok_or_else(|| {
        BatonError::UserError(
            "no lock record exists; the lock was released or force-broken".to_string(),
        )
    })?;

    if record.holder != token.holder {
        return Err(BatonError::UserError(format!(
            "lock is held by {}, not by {}",
            record.holder, token.holder
        )));
    }

    if record.status != LockStatus::Active {
        return Err(BatonError::UserError(format!(
            "lock is '{}'; heartbeats are only written while active",
            record.status
        )));
    }

    record.last_heartbeat_at = chrono::Utc::now();
    write_record(ctx, &record)?;

    let entry = AuditEntry::new(AuditEvent::Heartbeat, record.holder.to_string());
    audit::append_entry(ctx, &entry)?;
    Ok(())
}

/// Forcibly break an existing lock.
///
/// Attempts graceful termination of the recorded process, escalates after
/// the configured grace period, removes the record, and audits the break
/// with the previous holder's identity. Callers are responsible for the
/// staleness confirmation that authorizes this.
pub fn force_break(ctx: &WorkspaceContext, config: &Config, record: &LockRecord) -> Result<()> {
    if let Some(pid) = record.holder.pid
        && process::is_alive(pid)
    {
        process::terminate(
            pid,
            std::time::Duration::from_secs(config.force_break_grace_secs),
        )?;
    }

    remove_record(ctx)?;

    let entry = AuditEntry::new(AuditEvent::ForceBreak, record.holder.to_string()).with_details(
        json!({
            "previous_holder": record.holder.to_string(),
            "heartbeat_age_secs": record.heartbeat_age().num_seconds(),
            "status": record.status.to_string(),
        }),
    );
    audit::append_entry(ctx, &entry)?;
    Ok(())
}

/// Report the current lock state with a staleness evaluation.
pub fn status_report(ctx: &WorkspaceContext, config: &Config) -> Result<LockState> {
    match read_record(ctx)? {
        None => Ok(LockState::Free),
        Some(record) => {
            let verdict = stale::evaluate(
                &record,
                Duration::seconds(config.stale_threshold_secs as i64),
            );
            Ok(LockState::Held {
                stale: verdict.is_stale,
                record,
            })
        }
    }
}

/// Read the lock record, tolerating a racing writer.
///
/// A loser of the create race can observe the winner's record between
/// creation and content flush. Re-read briefly before treating the record
/// as corrupt.
fn read_record_settled(ctx: &WorkspaceContext) -> Result<Option<LockRecord>> {
    let mut last_err = None;
    for _ in 0..5 {
        match read_record(ctx) {
            Ok(record) => return Ok(record),
            Err(e) => {
                last_err = Some(e);
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        BatonError::UserError("failed to read lock record".to_string())
    }))
}

/// Read the lock record, mapping absence to `None`.
pub fn read_record(ctx: &WorkspaceContext) -> Result<Option<LockRecord>> {
    let path = ctx.lock_record_path();
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(BatonError::UserError(format!(
                "failed to read lock record '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| {
            BatonError::UserError(format!(
                "failed to parse lock record '{}': {}",
                path.display(),
                e
            ))
        })
}

/// Atomically rewrite the lock record in place.
pub fn write_record(ctx: &WorkspaceContext, record: &LockRecord) -> Result<()> {
    atomic_write_file(ctx.lock_record_path(), &record.to_json()?)
}

/// Remove the lock record. Idempotent: absence is success.
pub fn remove_record(ctx: &WorkspaceContext) -> Result<()> {
    match std::fs::remove_file(ctx.lock_record_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BatonError::UserError(format!(
            "failed to remove lock record: {}",
            e
        ))),
    }
}
