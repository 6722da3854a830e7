//! Atomic filesystem writes for baton.
//!
//! Every rewrite of a coordination record (lock record, handover manifest)
//! goes through `atomic_write_file`: content is written to a temporary file
//! in the target directory, fsynced, then renamed over the target. Readers
//! in other engine processes therefore never observe a torn record.
//!
//! On POSIX the rename is atomic when source and destination share a
//! filesystem; the temp file is always created next to the target. On other
//! platforms a remove-then-rename fallback is used, which narrows but does
//! not eliminate the window; the exclusive-create acquisition path never
//! relies on replace semantics.

use crate::error::{BatonError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `content`.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            BatonError::UserError(format!(
                "failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| BatonError::UserError(format!("invalid file path '{}'", path.display())))?;
    let temp_path = path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!(".{}.tmp", file_name));

    let mut file = File::create(&temp_path).map_err(|e| {
        BatonError::UserError(format!(
            "failed to create temporary file '{}': {}",
            temp_path.display(),
            e
        ))
    })?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            BatonError::UserError(format!(
                "failed to write temporary file '{}': {}",
                temp_path.display(),
                e
            ))
        })?;
    drop(file);

    replace(&temp_path, path)?;

    // Sync the directory entry as well so the rename survives a crash.
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

#[cfg(unix)]
fn replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        BatonError::UserError(format!(
            "failed to replace '{}': {}",
            target.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
fn replace(source: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        fs::remove_file(target).map_err(|e| {
            let _ = fs::remove_file(source);
            BatonError::UserError(format!("failed to replace '{}': {}", target.display(), e))
        })?;
    }
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        BatonError::UserError(format!("failed to replace '{}': {}", target.display(), e))
    })
}
