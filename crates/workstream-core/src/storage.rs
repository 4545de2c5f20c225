// crates/workstream-core/src/storage.rs
// ============================================================================
// Module: Atomic File Storage
// Description: Whole-file replacement via temp file + rename.
// Purpose: Guarantee readers see either the old or the new file, never a torn one.
// Dependencies: tempfile
// ============================================================================

//! Atomic whole-file writes shared by the registry, the audit logger and the
//! artefact handlers. The temp file is created in the destination directory
//! so the final rename never crosses a filesystem boundary.

use std::fs;
use std::io;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Atomically replaces `path` with `bytes`, creating parent directories.
///
/// # Errors
///
/// Returns an I/O error when the directory, temp file, or rename fails. On
/// failure the previous file content (if any) is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Atomically creates `path` with `bytes`, failing if it already exists.
///
/// # Errors
///
/// Returns [`io::ErrorKind::AlreadyExists`] when the file exists, or any other
/// I/O error from directory creation, writing, or the final link.
pub fn write_atomic_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist_noclobber(path).map_err(|err| err.error)?;
    Ok(())
}
