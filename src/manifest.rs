//! Handover manifest: the decision context passed between holders.
//!
//! The manifest transfers not just machine state but the outgoing engine's
//! reasoning: decisions taken (with rationale and alternatives), approaches
//! rejected (some flagged never to re-propose), remaining and blocked work,
//! and observations about the operator. It is written as the last
//! data-bearing commit step of termination and read once by the next engine
//! during its acquisition sequence.
//!
//! Storage is a single slot (`.baton/manifest.json`), overwritten atomically
//! on each handover (superseded, never merged). Every field written is
//! recoverable bit-for-bit by the subsequent read; lists preserve order.

use crate::context::WorkspaceContext;
use crate::error::{BatonError, Result};
use crate::fs::atomic_write_file;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A decision the outgoing engine made during its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// What was decided.
    pub decision: String,

    /// Why it was decided that way.
    pub rationale: String,

    /// Alternatives that were considered and passed over.
    #[serde(default)]
    pub alternatives_considered: Vec<String>,
}

/// An approach the outgoing engine tried or considered and rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedApproach {
    /// The rejected approach.
    pub approach: String,

    /// Why it was rejected.
    pub reason: String,

    /// When true, successor engines must not re-propose this approach.
    #[serde(default)]
    pub do_not_repropose: bool,
}

/// A next-step or blocked work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    /// Description of the item.
    pub description: String,

    /// When true, a human must act before an engine can proceed.
    #[serde(default)]
    pub requires_human_action: bool,
}

/// Identity and tenure of the engine that wrote the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousHolder {
    /// Engine name.
    pub engine: String,

    /// How long the engine held the lock, in seconds.
    pub held_for_secs: u64,
}

/// The context passed from the outgoing holder to the incoming one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoverManifest {
    /// Content-addressed marker of workspace state at handover: the
    /// checkpoint commit hash recorded by the termination prepare phase.
    pub workspace_version: String,

    /// Who is handing over, and for how long they held the workspace.
    pub previous_holder: PreviousHolder,

    /// Decisions made during the session, in the order they were made.
    #[serde(default)]
    pub decisions_made: Vec<Decision>,

    /// Approaches rejected during the session.
    #[serde(default)]
    pub rejected_approaches: Vec<RejectedApproach>,

    /// Work the successor should continue.
    #[serde(default)]
    pub next_steps: Vec<ActionItem>,

    /// Work that cannot proceed and why.
    #[serde(default)]
    pub blocked_items: Vec<ActionItem>,

    /// Free-form observations about the operator's preferences.
    #[serde(default)]
    pub preferences_learned: BTreeMap<String, String>,

    /// Short natural-language synopsis of the session.
    #[serde(default)]
    pub summary: String,

    /// When the manifest was written.
    pub written_at: DateTime<Utc>,
}

/// The portable part of a manifest, authored by the engine during its
/// session (YAML, typically `.baton/handover-draft.yaml`). The release
/// sequence supplies `workspace_version` and `previous_holder` itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDraft {
    pub decisions_made: Vec<Decision>,
    pub rejected_approaches: Vec<RejectedApproach>,
    pub next_steps: Vec<ActionItem>,
    pub blocked_items: Vec<ActionItem>,
    pub preferences_learned: BTreeMap<String, String>,
    pub summary: String,
}

impl ManifestDraft {
    /// Load a draft from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatonError::UserError(format!(
                "failed to read manifest draft '{}': {}",
                path.display(),
                e
            ))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            BatonError::UserError(format!(
                "failed to parse manifest draft '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Fill in the release-supplied fields to produce the full manifest.
    pub fn into_manifest(
        self,
        workspace_version: String,
        previous_holder: PreviousHolder,
    ) -> HandoverManifest {
        HandoverManifest {
            workspace_version,
            previous_holder,
            decisions_made: self.decisions_made,
            rejected_approaches: self.rejected_approaches,
            next_steps: self.next_steps,
            blocked_items: self.blocked_items,
            preferences_learned: self.preferences_learned,
            summary: self.summary,
            written_at: Utc::now(),
        }
    }
}

/// Atomically write the manifest into its single slot, superseding any
/// previous manifest.
pub fn write_manifest(ctx: &WorkspaceContext, manifest: &HandoverManifest) -> Result<()> {
    let content = serde_json::to_string_pretty(manifest)
        .map_err(|e| BatonError::UserError(format!("failed to serialize manifest: {}", e)))?;
    atomic_write_file(ctx.manifest_path(), &content)
}

/// Read the current manifest, if one has ever been written.
pub fn read_manifest(ctx: &WorkspaceContext) -> Result<Option<HandoverManifest>> {
    let path = ctx.manifest_path();
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(BatonError::UserError(format!(
                "failed to read manifest '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        BatonError::UserError(format!(
            "failed to parse manifest '{}': {}",
            path.display(),
            e
        ))
    })
}
