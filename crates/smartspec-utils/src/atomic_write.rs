//! Atomic file writes for governed artifacts and runtime reports.
//!
//! Writes go to a temporary file in the target directory, are fsynced, then
//! renamed over the destination. Line endings are normalized to LF so
//! governed artifacts diff cleanly across platforms.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write `content` to `path`, creating parent directories.
///
/// # Errors
/// Any IO failure during temp-file creation, write, fsync, or rename.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    let normalized = normalize_line_endings(content);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(normalized.as_bytes())
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to fsync temporary file")?;

    temp_file
        .persist(path.as_std_path())
        .with_context(|| format!("Failed to rename temporary file to: {path}"))?;
    Ok(())
}

/// Normalize CRLF and bare CR to LF.
#[must_use]
pub fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// blake3 hex digest of a file's content, if it exists.
///
/// Used for idempotence checks: a workflow re-run compares the hash of what
/// it would write against what is on disk and skips the write on a match.
///
/// # Errors
/// IO errors other than NotFound.
pub fn content_hash(path: &Utf8Path) -> Result<Option<String>> {
    match fs::read(path.as_std_path()) {
        Ok(bytes) => Ok(Some(blake3::hash(&bytes).to_hex().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read {path} for hashing")),
    }
}
