//! CLI argument parsing for baton.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Baton: file-based workspace exclusivity and handover coordinator for
/// autonomous agent engines.
///
/// Exactly one engine holds write authority over the shared workspace at a
/// time. State lives in `.baton/` at the workspace root:
/// - `lock.json` is the single global exclusivity token
/// - `manifest.json` carries decision context between holders
/// - `audit/audit.ndjson` records every transition
#[derive(Parser, Debug)]
#[command(name = "baton")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for baton.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize baton coordination state in the current workspace.
    ///
    /// Creates `.baton/` with the default configuration and excludes it
    /// from version control. Idempotent.
    Init,

    /// Acquire the global workspace lock for an engine.
    ///
    /// Fails fast if the lock is held. Prints the previous holder's
    /// handover manifest highlights on success.
    Acquire(AcquireArgs),

    /// Write a heartbeat on behalf of the holding engine.
    ///
    /// For manually driven engines that do not run the background monitor.
    Heartbeat(HeartbeatArgs),

    /// Release the lock via two-phase termination.
    ///
    /// Runs the standard commit steps (persist workspace, notify tracker,
    /// write handover manifest), then removes the lock record.
    Release(ReleaseArgs),

    /// Show lock state, holder identity, and heartbeat age.
    Status,

    /// Force-break a stale lock after explicit confirmation.
    ///
    /// Requires --force. Refuses to break a lock whose holder is live.
    Break(BreakArgs),

    /// Resolve a terminating/failed record left by an interrupted release.
    Recover(RecoverArgs),

    /// Fine-grained resource lock commands.
    ///
    /// Hierarchical keys (workspace:all > directory:<path> > file:<path> >
    /// task:<name>) for non-conflicting parallel work.
    Resource(ResourceCommand),

    /// Handover manifest commands.
    Manifest(ManifestCommand),

    /// Run an engine command under the lock for the whole session.
    ///
    /// Acquires, starts the heartbeat monitor, executes the command, then
    /// releases with the standard commit steps.
    Run(RunArgs),
}

/// Arguments for the `acquire` command.
#[derive(Parser, Debug)]
pub struct AcquireArgs {
    /// Engine name acquiring the lock (e.g. "gemini", "claude").
    pub engine: String,

    /// Process ID to record for liveness checks. Omit for a detached
    /// holder, whose staleness is then judged by heartbeat age alone.
    #[arg(long)]
    pub pid: Option<u32>,

    /// If the existing lock is stale, ask to break it and retry once.
    #[arg(long)]
    pub break_stale: bool,

    /// Skip the interactive confirmation (policy-gated consent).
    #[arg(long)]
    pub yes: bool,
}

/// Arguments for the `heartbeat` command.
#[derive(Parser, Debug)]
pub struct HeartbeatArgs {
    /// Engine name that holds the lock.
    pub engine: String,
}

/// Arguments for the `release` command.
#[derive(Parser, Debug)]
pub struct ReleaseArgs {
    /// Engine name that holds the lock.
    pub engine: String,

    /// One-line session summary for the handover manifest.
    #[arg(long)]
    pub summary: Option<String>,

    /// Manifest draft file (YAML) to hand over. Defaults to
    /// `.baton/handover-draft.yaml` when present.
    #[arg(long)]
    pub manifest: Option<PathBuf>,
}

/// Arguments for the `break` command.
#[derive(Parser, Debug)]
pub struct BreakArgs {
    /// Required for safety: breaking a lock can corrupt the workspace if
    /// the holder is still active.
    #[arg(long)]
    pub force: bool,

    /// Skip the interactive confirmation (policy-gated consent).
    #[arg(long)]
    pub yes: bool,
}

/// Arguments for the `recover` command.
#[derive(Parser, Debug)]
pub struct RecoverArgs {
    /// Resolution: "recover" (verify and continue), "rollback" (restore
    /// the recorded checkpoint), or "abort" (leave as-is).
    pub resolution: String,
}

/// Resource lock subcommands.
#[derive(Parser, Debug)]
pub struct ResourceCommand {
    #[command(subcommand)]
    pub action: ResourceAction,
}

/// Available resource lock actions.
#[derive(Subcommand, Debug)]
pub enum ResourceAction {
    /// Acquire a resource key. Non-blocking: fails immediately on
    /// contention; retry with backoff.
    Acquire(ResourceKeyArgs),

    /// Release a held resource key. Idempotent.
    Release(ResourceKeyArgs),

    /// List held resource locks with staleness markers.
    List,

    /// Forcibly clear an abandoned resource lock.
    Break(ResourceBreakArgs),
}

/// Arguments naming a resource key and the acting engine.
#[derive(Parser, Debug)]
pub struct ResourceKeyArgs {
    /// The resource key (e.g. "file:src/lib.rs", "directory:src",
    /// "task:migrate", "workspace:all").
    pub key: String,

    /// Engine name acting on the key.
    pub engine: String,

    /// Process ID to record for liveness checks.
    #[arg(long)]
    pub pid: Option<u32>,
}

/// Arguments for the `resource break` command.
#[derive(Parser, Debug)]
pub struct ResourceBreakArgs {
    /// The resource key to clear.
    pub key: String,

    /// Required for safety.
    #[arg(long)]
    pub force: bool,
}

/// Manifest subcommands.
#[derive(Parser, Debug)]
pub struct ManifestCommand {
    #[command(subcommand)]
    pub action: ManifestAction,
}

/// Available manifest actions.
#[derive(Subcommand, Debug)]
pub enum ManifestAction {
    /// Print the current handover manifest.
    Show,
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Engine name for the session.
    pub engine: String,

    /// If the existing lock is stale, ask to break it and retry once.
    #[arg(long)]
    pub break_stale: bool,

    /// Skip the interactive confirmation (policy-gated consent).
    #[arg(long)]
    pub yes: bool,

    /// The engine command to execute (after `--`).
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
