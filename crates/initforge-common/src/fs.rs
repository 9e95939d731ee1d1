//! Rotate-aside file writing
//!
//! Output artifacts are always built fully in memory and written in one
//! operation. An existing file at the destination is renamed aside first,
//! never deleted, so a previous build remains recoverable.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Suffix appended to a rotated backup file.
pub const ROTATE_SUFFIX: &str = "old";

/// Rename an existing file aside, returning the backup path if one was made.
///
/// A stale backup at the rotation target is replaced by the rename; the
/// current file is never deleted.
pub fn rotate_old(path: &Path) -> io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut backup = path.as_os_str().to_owned();
    backup.push(".");
    backup.push(ROTATE_SUFFIX);
    let backup = PathBuf::from(backup);

    tracing::debug!(
        "Rotating old file: {} -> {}",
        path.display(),
        backup.display()
    );
    fs::rename(path, &backup)?;
    Ok(Some(backup))
}

/// Create a directory and any missing parents.
pub fn mkdir(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    tracing::debug!("Creating directory: {}", path.display());
    fs::create_dir_all(path)
}

/// Write a complete buffer to `path` with the given unix mode.
///
/// Missing parent directories are created and any existing file is rotated
/// aside before the new content lands.
pub fn write_file(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        mkdir(parent)?;
    }
    rotate_old(path)?;

    fs::write(path, contents)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    tracing::debug!(
        "Wrote {} bytes to {} (mode {:o})",
        contents.len(),
        path.display(),
        mode
    );
    Ok(())
}

/// Write a script as newline-joined lines with a trailing newline.
pub fn write_script(path: &Path, lines: &[String], mode: u32) -> io::Result<()> {
    let mut contents = lines.join("\n");
    contents.push('\n');
    write_file(path, contents.as_bytes(), mode)
}
