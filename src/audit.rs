//! Audit log subsystem for baton.
//!
//! Every lock state transition is appended to an NDJSON log (one JSON object
//! per line) in `.baton/audit/audit.ndjson`. The log is append-only and safe
//! for concurrent readers at all times; external telemetry pipelines tail it.
//!
//! # Entry Format
//!
//! Each entry is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `event`: the transition (acquire/heartbeat/release/force_break/...)
//! - `holder`: the holder identity string (`engine@host#pid`)
//! - `details`: freeform object with event-specific details

use crate::context::WorkspaceContext;
use crate::error::{BatonError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Lock state transitions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Global lock acquired
    Acquire,
    /// Heartbeat written into the lock record
    Heartbeat,
    /// Global lock released (finalize completed)
    Release,
    /// Existing lock forcibly broken
    ForceBreak,
    /// Termination phase transition (terminating/failed_<k>/completed)
    PhaseChange,
    /// Fine-grained resource lock acquired
    ResourceAcquire,
    /// Fine-grained resource lock released
    ResourceRelease,
    /// Terminal record resolved (recover/rollback/abort)
    Recover,
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEvent::Acquire => write!(f, "acquire"),
            AuditEvent::Heartbeat => write!(f, "heartbeat"),
            AuditEvent::Release => write!(f, "release"),
            AuditEvent::ForceBreak => write!(f, "force_break"),
            AuditEvent::PhaseChange => write!(f, "phase_change"),
            AuditEvent::ResourceAcquire => write!(f, "resource_acquire"),
            AuditEvent::ResourceRelease => write!(f, "resource_release"),
            AuditEvent::Recover => write!(f, "recover"),
        }
    }
}

/// An immutable audit record, one per transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// RFC3339 timestamp when the transition occurred.
    pub ts: DateTime<Utc>,

    /// The transition that was recorded.
    pub event: AuditEvent,

    /// The holder identity the transition concerns (`engine@host#pid`).
    pub holder: String,

    /// Freeform details object with event-specific information.
    pub details: Value,
}

impl AuditEntry {
    /// Create a new entry for the given event and holder, timestamped now.
    pub fn new(event: AuditEvent, holder: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            event,
            holder: holder.into(),
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the details object for this entry.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the entry to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            BatonError::UserError(format!("failed to serialize audit entry to JSON: {}", e))
        })
    }
}

/// Append an entry to the audit log.
///
/// The entry is written as a single JSON line with a trailing newline and
/// fsynced so the log survives a crash of the writer. The audit directory
/// is created on first use.
pub fn append_entry(ctx: &WorkspaceContext, entry: &AuditEntry) -> Result<()> {
    let json_line = entry.to_ndjson_line()?;

    let audit_dir = ctx.audit_dir();
    if !audit_dir.exists() {
        fs::create_dir_all(&audit_dir).map_err(|e| {
            BatonError::UserError(format!(
                "failed to create audit directory '{}': {}",
                audit_dir.display(),
                e
            ))
        })?;
    }

    let audit_file = ctx.audit_file();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&audit_file)
        .map_err(|e| {
            BatonError::UserError(format!(
                "failed to open audit file '{}': {}",
                audit_file.display(),
                e
            ))
        })?;

    writeln!(file, "{}", json_line).map_err(|e| {
        BatonError::UserError(format!(
            "failed to append to audit file '{}': {}",
            audit_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        BatonError::UserError(format!(
            "failed to sync audit file '{}': {}",
            audit_file.display(),
            e
        ))
    })?;

    Ok(())
}

/// Read the last `n` entries from the audit log.
///
/// Unparseable lines are skipped; a missing log yields an empty list.
pub fn tail(ctx: &WorkspaceContext, n: usize) -> Result<Vec<AuditEntry>> {
    let audit_file = ctx.audit_file();
    if !audit_file.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&audit_file).map_err(|e| {
        BatonError::UserError(format!(
            "failed to read audit file '{}': {}",
            audit_file.display(),
            e
        ))
    })?;

    let entries: Vec<AuditEntry> = content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();

    let skip = entries.len().saturating_sub(n);
    Ok(entries.into_iter().skip(skip).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_initialized_workspace;
    use serde_json::json;

    #[test]
    fn entry_serializes_to_single_line_snake_case() {
        let entry = AuditEntry::new(AuditEvent::ForceBreak, "gemini@host#100")
            .with_details(json!({"previous_holder": "gemini@host#100"}));

        let line = entry.to_ndjson_line().unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"force_break\""));
        assert!(line.contains("gemini@host#100"));
    }

    #[test]
    fn append_creates_file_and_directory() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        fs::remove_dir_all(ctx.audit_dir()).ok();

        let entry = AuditEntry::new(AuditEvent::Acquire, "claude@host#7");
        append_entry(&ctx, &entry).unwrap();

        assert!(ctx.audit_file().exists());
        let content = fs::read_to_string(ctx.audit_file()).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn append_accumulates_lines_in_order() {
        let (_temp_dir, ctx) = create_initialized_workspace();

        append_entry(&ctx, &AuditEntry::new(AuditEvent::Acquire, "a@h#1")).unwrap();
        append_entry(&ctx, &AuditEntry::new(AuditEvent::Heartbeat, "a@h#1")).unwrap();
        append_entry(&ctx, &AuditEntry::new(AuditEvent::Release, "a@h#1")).unwrap();

        let entries = tail(&ctx, 10).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event, AuditEvent::Acquire);
        assert_eq!(entries[1].event, AuditEvent::Heartbeat);
        assert_eq!(entries[2].event, AuditEvent::Release);
    }

    #[test]
    fn tail_returns_most_recent_entries() {
        let (_temp_dir, ctx) = create_initialized_workspace();

        for i in 0..5 {
            let entry = AuditEntry::new(AuditEvent::Heartbeat, format!("a@h#{}", i));
            append_entry(&ctx, &entry).unwrap();
        }

        let entries = tail(&ctx, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].holder, "a@h#3");
        assert_eq!(entries[1].holder, "a@h#4");
    }

    #[test]
    fn tail_of_missing_log_is_empty() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        assert!(tail(&ctx, 10).unwrap().is_empty());
    }

    #[test]
    fn tail_skips_corrupt_lines() {
        let (_temp_dir, ctx) = create_initialized_workspace();
        append_entry(&ctx, &AuditEntry::new(AuditEvent::Acquire, "a@h#1")).unwrap();

        let mut file = OpenOptions::new()
            .append(true)
            .open(ctx.audit_file())
            .unwrap();
        writeln!(file, "not json").unwrap();
        drop(file);

        append_entry(&ctx, &AuditEntry::new(AuditEvent::Release, "a@h#1")).unwrap();

        let entries = tail(&ctx, 10).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn entry_round_trip_preserves_details() {
        let entry = AuditEntry::new(AuditEvent::PhaseChange, "claude@host#7").with_details(json!({
            "phase": "failed_2",
            "step": "notify_tracker",
        }));

        let line = entry.to_ndjson_line().unwrap();
        let parsed: AuditEntry = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed.event, AuditEvent::PhaseChange);
        assert_eq!(parsed.details["phase"], "failed_2");
        assert_eq!(parsed.details["step"], "notify_tracker");
    }
}
