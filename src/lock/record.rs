//! The persisted lock record and holder identity.

use crate::error::{BatonError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a lock holder: engine name, host, and optional pid.
///
/// Rendered as `engine@host#pid` (or `engine@host` for a detached holder)
/// in audit entries and error messages. A detached holder is one driven
/// manually through the CLI, where no single coordinating process outlives
/// the acquire call; liveness for such holders falls back to heartbeat age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderId {
    /// Engine name (e.g. "gemini", "claude").
    pub engine: String,

    /// Hostname the holder runs on.
    pub host: String,

    /// Process ID of the coordinating process, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl HolderId {
    /// Identity for a holder coordinated by the given process.
    pub fn with_pid(engine: &str, pid: u32) -> Self {
        Self {
            engine: engine.to_string(),
            host: get_host_string(),
            pid: Some(pid),
        }
    }

    /// Identity for a detached (manually driven) holder.
    pub fn detached(engine: &str) -> Self {
        Self {
            engine: engine.to_string(),
            host: get_host_string(),
            pid: None,
        }
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{}@{}#{}", self.engine, self.host, pid),
            None => write!(f, "{}@{}", self.engine, self.host),
        }
    }
}

/// Get the host string for holder identity.
fn get_host_string() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Lifecycle state of the lock record.
///
/// Serialized as a single status string: `active`, `terminating`,
/// `failed_<k>`, `completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LockStatus {
    /// The holder has write authority; heartbeats are expected.
    Active,
    /// Termination prepare completed; commit steps are running.
    Terminating,
    /// Commit step k (1-based) failed; surfaced to the next acquirer.
    Failed(usize),
    /// All commit steps succeeded; the record is about to be removed.
    Completed,
}

impl LockStatus {
    /// True for the states a next acquirer must resolve before acquiring.
    pub fn needs_recovery(&self) -> bool {
        matches!(self, LockStatus::Terminating | LockStatus::Failed(_))
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Active => write!(f, "active"),
            LockStatus::Terminating => write!(f, "terminating"),
            LockStatus::Failed(step) => write!(f, "failed_{}", step),
            LockStatus::Completed => write!(f, "completed"),
        }
    }
}

impl From<LockStatus> for String {
    fn from(status: LockStatus) -> Self {
        status.to_string()
    }
}

impl TryFrom<String> for LockStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "active" => Ok(LockStatus::Active),
            "terminating" => Ok(LockStatus::Terminating),
            "completed" => Ok(LockStatus::Completed),
            other => match other.strip_prefix("failed_") {
                Some(step) => step
                    .parse::<usize>()
                    .map(LockStatus::Failed)
                    .map_err(|_| format!("invalid lock status '{}'", other)),
                None => Err(format!("invalid lock status '{}'", other)),
            },
        }
    }
}

/// The single global exclusivity token, stored at `.baton/lock.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Identity of the current holder.
    pub holder: HolderId,

    /// Timestamp when the lock was acquired (RFC3339).
    pub acquired_at: DateTime<Utc>,

    /// Timestamp of the most recent heartbeat (RFC3339).
    pub last_heartbeat_at: DateTime<Utc>,

    /// Lifecycle state.
    pub status: LockStatus,

    /// Workspace checkpoint reference recorded by the termination prepare
    /// phase; absent while the lock is active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_ref: Option<String>,
}

impl LockRecord {
    /// Create a fresh active record for the given holder, timestamped now.
    pub fn new(holder: HolderId) -> Self {
        let now = Utc::now();
        Self {
            holder,
            acquired_at: now,
            last_heartbeat_at: now,
            status: LockStatus::Active,
            checkpoint_ref: None,
        }
    }

    /// Serialize the record to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BatonError::UserError(format!("failed to serialize lock record: {}", e)))
    }

    /// Age of the most recent heartbeat.
    pub fn heartbeat_age(&self) -> Duration {
        Utc::now().signed_duration_since(self.last_heartbeat_at)
    }

    /// Time the lock has been held.
    pub fn held_for(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Format a duration as a human-readable age string.
    pub fn format_age(age: Duration) -> String {
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m", minutes)
        } else {
            format!("{}s", age.num_seconds().max(0))
        }
    }
}
