//! Stale-lock detection and the break-confirmation policy.
//!
//! Staleness alone never authorizes breaking a lock: a false positive
//! (clock skew, a slow heartbeat writer) would produce two concurrent
//! holders, which is exactly the corruption the protocol exists to prevent.
//! The decision is a pluggable capability so interactive deployments can
//! prompt a human while automated ones gate on policy.

use super::record::LockRecord;
use crate::process;
use chrono::Duration;
use std::io::Write;

/// Outcome of the process-liveness probe for a recorded holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// The recorded pid answers the liveness probe.
    Alive,
    /// The recorded pid no longer exists.
    Dead,
    /// No pid was recorded (detached holder); liveness cannot be probed.
    Unknown,
}

/// Result of evaluating an existing active record for staleness.
#[derive(Debug, Clone, Copy)]
pub struct StaleVerdict {
    /// Whether acquisition may proceed to the confirmation step.
    pub is_stale: bool,

    /// What the liveness probe reported.
    pub liveness: Liveness,

    /// Age of the last heartbeat in seconds.
    pub heartbeat_age_secs: i64,
}

/// Evaluate an existing `active` record.
///
/// 1. If the recorded process is no longer alive, the lock is stale; no
///    age threshold is needed.
/// 2. Otherwise the lock is stale only if the heartbeat age exceeds
///    `stale_threshold`.
pub fn evaluate(record: &LockRecord, stale_threshold: Duration) -> StaleVerdict {
    let age = record.heartbeat_age();
    let liveness = match record.holder.pid {
        Some(pid) => {
            if process::is_alive(pid) {
                Liveness::Alive
            } else {
                Liveness::Dead
            }
        }
        None => Liveness::Unknown,
    };

    let is_stale = match liveness {
        Liveness::Dead => true,
        Liveness::Alive | Liveness::Unknown => age > stale_threshold,
    };

    StaleVerdict {
        is_stale,
        liveness,
        heartbeat_age_secs: age.num_seconds(),
    }
}

/// Decision capability consulted before a stale lock may be broken.
pub trait BreakPolicy {
    /// Return true to authorize breaking the given stale lock.
    fn confirm_break(&self, record: &LockRecord, verdict: &StaleVerdict) -> bool;
}

/// Never authorizes a break. The default for unattended acquisition.
pub struct DenyBreak;

impl BreakPolicy for DenyBreak {
    fn confirm_break(&self, _record: &LockRecord, _verdict: &StaleVerdict) -> bool {
        false
    }
}

/// Always authorizes a break. Used when the operator passed an explicit
/// consent flag (`--yes`), which is the policy decision.
pub struct AllowBreak;

impl BreakPolicy for AllowBreak {
    fn confirm_break(&self, _record: &LockRecord, _verdict: &StaleVerdict) -> bool {
        true
    }
}

/// Interactive confirmation on the controlling terminal.
pub struct PromptBreak;

impl BreakPolicy for PromptBreak {
    fn confirm_break(&self, record: &LockRecord, verdict: &StaleVerdict) -> bool {
        let liveness = match verdict.liveness {
            Liveness::Alive => "process alive",
            Liveness::Dead => "process dead",
            Liveness::Unknown => "no recorded process",
        };
        eprint!(
            "Lock held by {} appears stale ({}, last heartbeat {}s ago).\n\
             Break it? This is unsafe if the holder is still working. [y/N] ",
            record.holder, liveness, verdict.heartbeat_age_secs
        );
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    }
}
