//! Fine-grained, hierarchical resource locks.
//!
//! Resource locks let engines do non-conflicting parallel work beneath the
//! global exclusivity lock. Keys form a hierarchy:
//!
//! ```text
//! workspace:all > directory:<path> > file:<path> > task:<name>
//! ```
//!
//! A key may be granted only if neither the global lock nor any ancestor
//! key is held by a different holder, and no descendant key is held by a
//! different holder (the hierarchy invariant must hold from both
//! directions). Acquisition is non-blocking: contention fails immediately
//! and the caller retries with its own backoff, so independent engines
//! cannot deadlock on in-process waits.
//!
//! Each held key is one JSON lock file in `.baton/resources/`, created with
//! exclusive-create semantics like the global record. Abandoned locks
//! (holder process dead, or no pid and past the stale threshold) are
//! detected by the same liveness check as the global lock and cleared
//! through the same confirmation path.

use crate::audit::{self, AuditEntry, AuditEvent};
use crate::config::Config;
use crate::context::WorkspaceContext;
use crate::error::{BatonError, Result};
use crate::lock::{self, HolderId, LockStatus};
use crate::process;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A key in the resource hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ResourceKey {
    /// The whole workspace (`workspace:all`).
    Workspace,
    /// A directory subtree (`directory:<path>`).
    Directory(String),
    /// A single file (`file:<path>`).
    File(String),
    /// A named task (`task:<name>`).
    Task(String),
}

impl ResourceKey {
    /// Parse a key from its `kind:value` string form.
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, value) = s.split_once(':').ok_or_else(|| {
            BatonError::UserError(format!(
                "invalid resource key '{}': expected workspace:all, directory:<path>, \
                 file:<path>, or task:<name>",
                s
            ))
        })?;

        let value = value.trim_matches('/');
        match kind {
            "workspace" if value == "all" => Ok(ResourceKey::Workspace),
            "workspace" => Err(BatonError::UserError(format!(
                "invalid resource key '{}': the workspace key is 'workspace:all'",
                s
            ))),
            "directory" | "file" | "task" if value.is_empty() => Err(BatonError::UserError(
                format!("invalid resource key '{}': empty value", s),
            )),
            "directory" => Ok(ResourceKey::Directory(value.to_string())),
            "file" => Ok(ResourceKey::File(value.to_string())),
            "task" => Ok(ResourceKey::Task(value.to_string())),
            _ => Err(BatonError::UserError(format!(
                "invalid resource key '{}': unknown kind '{}'",
                s, kind
            ))),
        }
    }

    /// Ancestor keys from the hierarchy root down, excluding the key itself.
    ///
    /// `file:src/parser/lexer.rs` yields `workspace:all`, `directory:src`,
    /// `directory:src/parser`.
    pub fn ancestors(&self) -> Vec<ResourceKey> {
        let mut ancestors = vec![ResourceKey::Workspace];
        match self {
            ResourceKey::Workspace | ResourceKey::Task(_) => {}
            ResourceKey::Directory(path) | ResourceKey::File(path) => {
                let mut prefix = String::new();
                for component in Path::new(path).components() {
                    let component = component.as_os_str().to_string_lossy();
                    if !prefix.is_empty() {
                        prefix.push('/');
                    }
                    prefix.push_str(&component);
                    // The full path of a directory key is the key itself,
                    // not an ancestor.
                    if matches!(self, ResourceKey::File(_)) || prefix != *path {
                        ancestors.push(ResourceKey::Directory(prefix.clone()));
                    }
                }
                // A file's own path is not a directory ancestor.
                if matches!(self, ResourceKey::File(_)) {
                    ancestors.pop();
                }
            }
        }
        ancestors
    }

    /// Whether `self` is an ancestor of `other` in the hierarchy.
    pub fn is_ancestor_of(&self, other: &ResourceKey) -> bool {
        self != other && other.ancestors().contains(self)
    }

    /// Encode the key as a reversible, filename-safe lock file name.
    pub fn file_name(&self) -> String {
        let mut encoded = String::new();
        for byte in self.to_string().bytes() {
            match byte {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-' => {
                    encoded.push(byte as char)
                }
                other => encoded.push_str(&format!("%{:02X}", other)),
            }
        }
        format!("{}.lock", encoded)
    }

    /// Decode a lock file name produced by `file_name`.
    pub fn from_file_name(name: &str) -> Result<Self> {
        let encoded = name.strip_suffix(".lock").ok_or_else(|| {
            BatonError::UserError(format!("'{}' is not a resource lock file name", name))
        })?;

        let mut decoded = Vec::new();
        let bytes = encoded.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let hex = encoded.get(i + 1..i + 3).ok_or_else(|| {
                    BatonError::UserError(format!("truncated escape in '{}'", name))
                })?;
                let byte = u8::from_str_radix(hex, 16).map_err(|_| {
                    BatonError::UserError(format!("invalid escape '%{}' in '{}'", hex, name))
                })?;
                decoded.push(byte);
                i += 3;
            } else {
                decoded.push(bytes[i]);
                i += 1;
            }
        }

        let key = String::from_utf8(decoded)
            .map_err(|_| BatonError::UserError(format!("invalid utf-8 in '{}'", name)))?;
        Self::parse(&key)
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKey::Workspace => write!(f, "workspace:all"),
            ResourceKey::Directory(path) => write!(f, "directory:{}", path),
            ResourceKey::File(path) => write!(f, "file:{}", path),
            ResourceKey::Task(name) => write!(f, "task:{}", name),
        }
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        ResourceKey::parse(&s).map_err(|e| e.to_string())
    }
}

/// A held fine-grained lock, as persisted in `.baton/resources/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    /// The locked key.
    pub resource_key: ResourceKey,

    /// Who holds it.
    pub holder: HolderId,

    /// When it was granted (RFC3339).
    pub acquired_at: DateTime<Utc>,
}

/// A listed resource lock with its staleness evaluation.
#[derive(Debug, Clone)]
pub struct ResourceLockInfo {
    /// The lock file path.
    pub path: PathBuf,

    /// The persisted lock.
    pub lock: ResourceLock,

    /// Whether the holder is dead (or, for detached holders, past the stale
    /// threshold).
    pub is_stale: bool,
}

/// Acquire `key` for `holder`. Non-blocking: contention is an immediate
/// error, never an in-process wait.
///
/// Re-acquisition of a key already held by the same holder is granted.
pub fn resource_acquire(
    ctx: &WorkspaceContext,
    config: &Config,
    key: &ResourceKey,
    holder: &HolderId,
) -> Result<()> {
    // The global lock sits above workspace:all in the hierarchy.
    if let Some(record) = lock::read_record(ctx)?
        && record.status == LockStatus::Active
        && record.holder != *holder
    {
        return Err(BatonError::AncestorLocked {
            key: key.to_string(),
            ancestor: "workspace:all".to_string(),
            holder: record.holder.to_string(),
        });
    }

    for ancestor in key.ancestors() {
        if let Some(existing) = read_resource(ctx, &ancestor)?
            && existing.holder != *holder
        {
            return Err(BatonError::AncestorLocked {
                key: key.to_string(),
                ancestor: ancestor.to_string(),
                holder: existing.holder.to_string(),
            });
        }
    }

    // The invariant must hold from both directions: granting a directory
    // while a different holder owns a file beneath it would give that file
    // a foreign ancestor.
    for info in list_resources(ctx, config)? {
        if key.is_ancestor_of(&info.lock.resource_key) && info.lock.holder != *holder {
            return Err(BatonError::ResourceBusy {
                key: key.to_string(),
                holder: info.lock.holder.to_string(),
            });
        }
    }

    if let Some(existing) = read_resource(ctx, key)? {
        if existing.holder == *holder {
            return Ok(());
        }
        return Err(BatonError::ResourceBusy {
            key: key.to_string(),
            holder: existing.holder.to_string(),
        });
    }

    let resource_lock = ResourceLock {
        resource_key: key.clone(),
        holder: holder.clone(),
        acquired_at: Utc::now(),
    };
    if !try_exclusive_create(ctx, &resource_lock)? {
        // Lost a creation race; report whoever won.
        let winner = read_resource(ctx, key)?;
        return Err(BatonError::ResourceBusy {
            key: key.to_string(),
            holder: winner
                .map(|l| l.holder.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        });
    }

    let entry = AuditEntry::new(AuditEvent::ResourceAcquire, holder.to_string())
        .with_details(serde_json::json!({"resource_key": key.to_string()}));
    audit::append_entry(ctx, &entry)?;
    Ok(())
}

/// Release `key` held by `holder`. Idempotent: releasing an unheld key
/// succeeds silently. Releasing a key held by someone else is an error.
pub fn resource_release(ctx: &WorkspaceContext, key: &ResourceKey, holder: &HolderId) -> Result<()> {
    let existing = match read_resource(ctx, key)? {
        Some(existing) => existing,
        None => return Ok(()),
    };

    if existing.holder != *holder {
        return Err(BatonError::UserError(format!(
            "resource '{}' is held by {}, not by {}; use the force-break path instead",
            key, existing.holder, holder
        )));
    }

    fs::remove_file(resource_path(ctx, key)).map_err(|e| {
        BatonError::UserError(format!("failed to release resource '{}': {}", key, e))
    })?;

    let entry = AuditEntry::new(AuditEvent::ResourceRelease, holder.to_string())
        .with_details(serde_json::json!({"resource_key": key.to_string()}));
    audit::append_entry(ctx, &entry)?;
    Ok(())
}

/// Forcibly clear an abandoned resource lock, regardless of holder.
///
/// Callers are responsible for the staleness confirmation that authorizes
/// this, exactly as for the global lock.
pub fn resource_break(ctx: &WorkspaceContext, key: &ResourceKey) -> Result<ResourceLock> {
    let existing = read_resource(ctx, key)?.ok_or_else(|| {
        BatonError::UserError(format!("resource '{}' is not locked", key))
    })?;

    fs::remove_file(resource_path(ctx, key)).map_err(|e| {
        BatonError::UserError(format!("failed to clear resource '{}': {}", key, e))
    })?;

    let entry = AuditEntry::new(AuditEvent::ForceBreak, existing.holder.to_string()).with_details(
        serde_json::json!({
            "resource_key": key.to_string(),
            "previous_holder": existing.holder.to_string(),
        }),
    );
    audit::append_entry(ctx, &entry)?;
    Ok(existing)
}

/// List all held resource locks with staleness evaluation.
pub fn list_resources(ctx: &WorkspaceContext, config: &Config) -> Result<Vec<ResourceLockInfo>> {
    let dir = ctx.resources_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&dir).map_err(|e| {
        BatonError::UserError(format!(
            "failed to read resources directory '{}': {}",
            dir.display(),
            e
        ))
    })?;

    let stale_threshold = Duration::seconds(config.stale_threshold_secs as i64);
    let mut locks = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| {
            BatonError::UserError(format!("failed to read resources directory entry: {}", e))
        })?;
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Ok(key_from_name) = ResourceKey::from_file_name(name) else {
            continue;
        };

        // Skip files that don't parse; a half-written lock from a crashed
        // writer shouldn't wedge the listing.
        let Ok(content) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(resource_lock) = serde_json::from_str::<ResourceLock>(&content) else {
            continue;
        };
        // A renamed or hand-edited file no longer locks the key its name
        // claims; ignore it rather than report a phantom grant.
        if resource_lock.resource_key != key_from_name {
            continue;
        }

        let is_stale = match resource_lock.holder.pid {
            Some(pid) => !process::is_alive(pid),
            None => {
                Utc::now().signed_duration_since(resource_lock.acquired_at) > stale_threshold
            }
        };

        locks.push(ResourceLockInfo {
            path,
            lock: resource_lock,
            is_stale,
        });
    }

    locks.sort_by_key(|info| info.lock.resource_key.to_string());
    Ok(locks)
}

fn resource_path(ctx: &WorkspaceContext, key: &ResourceKey) -> PathBuf {
    ctx.resources_dir().join(key.file_name())
}

fn read_resource(ctx: &WorkspaceContext, key: &ResourceKey) -> Result<Option<ResourceLock>> {
    let path = resource_path(ctx, key);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(BatonError::UserError(format!(
                "failed to read resource lock '{}': {}",
                path.display(),
                e
            )));
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        BatonError::UserError(format!(
            "failed to parse resource lock '{}': {}",
            path.display(),
            e
        ))
    })
}

fn try_exclusive_create(ctx: &WorkspaceContext, resource_lock: &ResourceLock) -> Result<bool> {
    let path = resource_path(ctx, &resource_lock.resource_key);
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            BatonError::UserError(format!(
                "failed to create resources directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(BatonError::UserError(format!(
                "failed to create resource lock '{}': {}",
                path.display(),
                e
            )));
        }
    };

    let content = serde_json::to_string_pretty(resource_lock)
        .map_err(|e| BatonError::UserError(format!("failed to serialize resource lock: {}", e)))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(&path);
            BatonError::UserError(format!("failed to write resource lock: {}", e))
        })?;

    Ok(true)
}
