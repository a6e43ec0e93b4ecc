//! Atomic replacement and backups.
//!
//! Rewrites never modify a file in place: new content goes to a temporary
//! file in the same directory and is renamed over the original only once it
//! is fully written. A killed process leaves either the old or the new file,
//! plus any backup taken before the rename.

use crate::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;

/// Create an empty temporary file next to `path`.
pub(crate) fn sibling_temp(path: &Path) -> Result<NamedTempFile> {
    let dir = parent_dir(path);
    tempfile::Builder::new()
        .prefix(".bundleid-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io_at(dir, e))
}

/// Replace `path` with `contents` atomically.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let temp = write_temp(path, contents)?;
    persist(temp, path)
}

/// Write `contents` to a synced temporary file next to `path`, carrying over
/// the permissions of `path`. Nothing is renamed yet.
pub(crate) fn write_temp(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let mut temp = sibling_temp(path)?;
    temp.write_all(contents)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| Error::io_at(temp.path(), e))?;
    keep_permissions(path, temp.path());
    Ok(temp)
}

/// Rename a fully written temporary file over `path`.
pub(crate) fn persist(temp: NamedTempFile, path: &Path) -> Result<()> {
    temp.persist(path)
        .map_err(|e| Error::io_at(path, e.error))?;
    Ok(())
}

/// Copy `path` to a timestamped backup next to it and return the backup
/// path, e.g. `project.pbxproj` → `project.pbxproj.1760600000.bak`.
pub(crate) fn backup(path: &Path) -> Result<PathBuf> {
    let target = backup_path(path);
    fs::copy(path, &target).map_err(|e| Error::io_at(&target, e))?;
    tracing::debug!(from = %path.display(), to = %target.display(), "backup written");
    Ok(target)
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut candidate = path.with_file_name(format!("{name}.{stamp}.bak"));
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{name}.{stamp}-{n}.bak"));
        n += 1;
    }
    candidate
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(unix)]
fn keep_permissions(original: &Path, temp: &Path) {
    if let Ok(meta) = fs::metadata(original) {
        let _ = fs::set_permissions(temp, meta.permissions());
    }
}

#[cfg(not(unix))]
fn keep_permissions(_original: &Path, _temp: &Path) {}
