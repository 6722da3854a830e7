//! Proof of acquisition handed back by `acquire`.

use super::record::HolderId;
use chrono::{DateTime, Utc};

/// Token returned by a successful acquisition.
///
/// The token is the capability passed to `heartbeat` and `release`; both
/// verify it against the persisted record's holder before mutating, so a
/// token that outlived its lock (force-broken, or released elsewhere)
/// cannot corrupt a successor's session.
///
/// Deliberately not a Drop-releasing guard: release is the two-phase
/// termination protocol, never an implicit side effect of scope exit.
#[derive(Debug, Clone)]
pub struct LockToken {
    /// The holder identity recorded at acquisition.
    pub holder: HolderId,

    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
}

impl LockToken {
    pub(super) fn new(holder: HolderId, acquired_at: DateTime<Utc>) -> Self {
        Self {
            holder,
            acquired_at,
        }
    }

    /// Reconstruct a token for a detached holder from the persisted record.
    ///
    /// Used by CLI commands that act on behalf of the holding engine in a
    /// later process (manual heartbeat, release). The caller must have
    /// verified that `holder` matches the persisted record.
    pub fn for_holder(holder: HolderId, acquired_at: DateTime<Utc>) -> Self {
        Self {
            holder,
            acquired_at,
        }
    }
}
