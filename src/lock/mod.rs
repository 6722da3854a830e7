//! Global exclusivity lock for baton.
//!
//! This module implements the single workspace-wide lock that guarantees at
//! most one engine holds write authority at any instant:
//! - `LockRecord` / `LockStatus`: the persisted token at `.baton/lock.json`
//! - `HolderId`: engine + host + optional pid identity
//! - acquisition via **create_new** semantics (exclusive create), so that
//!   concurrent callers racing within microseconds still yield exactly one
//!   winner; there is no separate check-then-create window
//! - stale-lock detection (process liveness, then heartbeat age) with a
//!   pluggable break-confirmation policy
//! - force-break with graceful-then-forceful holder termination
//!
//! The record is absent when the workspace is free. It is mutated only by
//! its holder; a non-holder may remove it solely through the confirmed
//! force-break or recovery paths. Every transition appends an audit entry.

mod operations;
mod record;
mod stale;
mod token;


// Re-export public API
pub use operations::{
    LockState, acquire, force_break, heartbeat, read_record, remove_record, status_report,
    write_record,
};
pub use record::{HolderId, LockRecord, LockStatus};
pub use stale::{AllowBreak, BreakPolicy, DenyBreak, Liveness, PromptBreak, StaleVerdict, evaluate};
pub use token::LockToken;
