//! Error types for the baton CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error
//! messages. The variants carry the full error taxonomy of the exclusivity
//! protocol; each maps to a stable exit code.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for baton operations.
#[derive(Error, Debug)]
pub enum BatonError {
    /// User provided invalid arguments or the workspace is in an invalid state.
    #[error("{0}")]
    UserError(String),

    /// Git operation failed.
    #[error("Git operation failed: {0}")]
    GitError(String),

    /// The global lock is held by a live holder.
    ///
    /// Recoverable by waiting for the holder to release, or by an explicit
    /// force-break after staleness confirmation.
    #[error("workspace lock is held by {holder} (heartbeat {age_secs}s ago)")]
    AlreadyHeld { holder: String, age_secs: i64 },

    /// The lock looks stale but breaking it requires explicit authorization.
    ///
    /// Never auto-resolved: a false staleness verdict (clock skew, slow
    /// heartbeat writer) would create concurrent holders.
    #[error(
        "workspace lock held by {holder} appears stale (heartbeat {age_secs}s ago) \
         but breaking it requires confirmation.\n\
         Re-run with --break-stale --yes, or use `baton break --force`."
    )]
    StaleLockNeedsConfirmation { holder: String, age_secs: i64 },

    /// A prior termination left the record in a terminal, non-active state.
    ///
    /// Must be resolved through `baton recover` (recover/rollback/abort)
    /// before the workspace can be acquired again.
    #[error(
        "workspace lock is in state '{status}' (previous holder: {holder}).\n\
         A previous termination did not complete. Resolve it with:\n  \
         baton recover recover   # verify consistency and continue\n  \
         baton recover rollback  # restore the recorded checkpoint\n  \
         baton recover abort     # leave as-is for manual intervention"
    )]
    PendingRecovery { status: String, holder: String },

    /// The termination prepare phase failed; the lock record was not touched.
    #[error("termination prepare failed: {0}")]
    PrepareFailed(String),

    /// Commit step `step` (1-based) failed; persisted as `failed_<step>`.
    #[error("termination commit step {step} ({name}) failed: {detail}")]
    CommitStepFailed {
        step: usize,
        name: String,
        detail: String,
    },

    /// Rollback was requested but no checkpoint reference was recorded.
    #[error("cannot roll back: the lock record carries no checkpoint reference")]
    CheckpointMissing,

    /// Restoring the recorded checkpoint failed; manual intervention required.
    #[error("rollback to checkpoint failed: {0}")]
    RollbackFailed(String),

    /// The exact resource key is held by a different holder.
    #[error("resource '{key}' is held by {holder}")]
    ResourceBusy { key: String, holder: String },

    /// An ancestor of the requested resource key is held by a different holder.
    #[error("resource '{key}' is blocked: ancestor '{ancestor}' is held by {holder}")]
    AncestorLocked {
        key: String,
        ancestor: String,
        holder: String,
    },
}

impl BatonError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            BatonError::UserError(_) => exit_codes::USER_ERROR,
            BatonError::GitError(_) => exit_codes::GIT_FAILURE,
            BatonError::AlreadyHeld { .. }
            | BatonError::StaleLockNeedsConfirmation { .. }
            | BatonError::PendingRecovery { .. } => exit_codes::LOCK_FAILURE,
            BatonError::PrepareFailed(_) | BatonError::CommitStepFailed { .. } => {
                exit_codes::TERMINATION_FAILURE
            }
            BatonError::CheckpointMissing | BatonError::RollbackFailed(_) => {
                exit_codes::RECOVERY_FAILURE
            }
            BatonError::ResourceBusy { .. } | BatonError::AncestorLocked { .. } => {
                exit_codes::RESOURCE_FAILURE
            }
        }
    }
}

/// Result type alias for baton operations.
pub type Result<T> = std::result::Result<T, BatonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_error_has_correct_exit_code() {
        let err = BatonError::UserError("bad argument".to_string());
        assert_eq!(err.exit_code(), exit_codes::USER_ERROR);
    }

    #[test]
    fn lock_errors_map_to_lock_failure() {
        let err = BatonError::AlreadyHeld {
            holder: "gemini@host#100".to_string(),
            age_secs: 42,
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);

        let err = BatonError::StaleLockNeedsConfirmation {
            holder: "gemini@host#100".to_string(),
            age_secs: 2000,
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);

        let err = BatonError::PendingRecovery {
            status: "failed_2".to_string(),
            holder: "gemini@host#100".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::LOCK_FAILURE);
    }

    #[test]
    fn termination_errors_map_to_termination_failure() {
        let err = BatonError::PrepareFailed("checkpoint failed".to_string());
        assert_eq!(err.exit_code(), exit_codes::TERMINATION_FAILURE);

        let err = BatonError::CommitStepFailed {
            step: 2,
            name: "notify_tracker".to_string(),
            detail: "command exited 1".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::TERMINATION_FAILURE);
    }

    #[test]
    fn recovery_errors_map_to_recovery_failure() {
        assert_eq!(
            BatonError::CheckpointMissing.exit_code(),
            exit_codes::RECOVERY_FAILURE
        );
        assert_eq!(
            BatonError::RollbackFailed("reset failed".to_string()).exit_code(),
            exit_codes::RECOVERY_FAILURE
        );
    }

    #[test]
    fn resource_errors_map_to_resource_failure() {
        let err = BatonError::ResourceBusy {
            key: "file:src/lib.rs".to_string(),
            holder: "claude@host#7".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::RESOURCE_FAILURE);

        let err = BatonError::AncestorLocked {
            key: "file:src/lib.rs".to_string(),
            ancestor: "directory:src".to_string(),
            holder: "claude@host#7".to_string(),
        };
        assert_eq!(err.exit_code(), exit_codes::RESOURCE_FAILURE);
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = BatonError::AlreadyHeld {
            holder: "gemini@host#100".to_string(),
            age_secs: 42,
        };
        let msg = err.to_string();
        assert!(msg.contains("gemini@host#100"));
        assert!(msg.contains("42"));

        let err = BatonError::CommitStepFailed {
            step: 2,
            name: "notify_tracker".to_string(),
            detail: "exit 1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("step 2"));
        assert!(msg.contains("notify_tracker"));
    }
}
