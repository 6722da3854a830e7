//! Exit code constants for the baton CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid state, uninitialized workspace)
//! - 2: Termination failure (prepare or a commit step failed)
//! - 3: Git operation failure
//! - 4: Lock acquisition failure (held, stale-unconfirmed, or pending recovery)
//! - 5: Recovery failure (missing checkpoint, rollback failed)
//! - 6: Resource lock contention (busy or ancestor held)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid state, or uninitialized workspace.
pub const USER_ERROR: i32 = 1;

/// Termination failure: prepare phase or a named commit step failed.
pub const TERMINATION_FAILURE: i32 = 2;

/// Git operation failure: checkpoint, restore, or workspace persistence errors.
pub const GIT_FAILURE: i32 = 3;

/// Lock acquisition failure: held by a live holder, staleness unconfirmed,
/// or a prior termination left the record in a terminal state.
pub const LOCK_FAILURE: i32 = 4;

/// Recovery failure: checkpoint missing or rollback could not complete.
pub const RECOVERY_FAILURE: i32 = 5;

/// Resource lock contention: key busy or an ancestor key is held.
pub const RESOURCE_FAILURE: i32 = 6;
