//! Structural validation of database files and artifacts
//!
//! A file is valid when it exists, is non-empty, opens as an SQLite database
//! and `PRAGMA integrity_check` reports `ok`. Gzip artifacts are decompressed
//! to a private temp file first; the temp file is removed on every path out.
//! The file under test is only ever opened read-only.
//!
//! Opening a database whose header is marked WAL makes SQLite create `-wal`
//! and `-shm` files next to it, even read-only. Artifact checks remove the
//! ones they created; the live database is left alone since the host
//! application owns its side files.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use super::artifact::is_compressed;
use super::compress::gunzip_to_temp;
use crate::error::{BackupError, BackupResult};

/// Side files SQLite may create while a WAL database is open
const WAL_SIDE_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Check a database file or gzip artifact, returning why it is invalid
///
/// Meant for artifacts: any side file the check itself creates is removed.
pub fn check(path: &Path) -> BackupResult<()> {
    check_metadata(path)?;

    if is_compressed(path) {
        let temp = gunzip_to_temp(path).map_err(|e| BackupError::integrity(path, e.to_string()))?;
        let result = check_database(temp.path());
        remove_side_files(temp.path(), &[]);
        return result.map_err(|e| BackupError::integrity(path, e.to_string()));
    }

    let existing: Vec<PathBuf> = side_files(path).into_iter().filter(|p| p.exists()).collect();
    let result = check_database(path);
    remove_side_files(path, &existing);
    result
}

/// Check the live database in place, leaving its side files untouched
pub fn check_live(path: &Path) -> BackupResult<()> {
    check_metadata(path)?;
    check_database(path)
}

/// Whether a database file or gzip artifact is structurally sound
pub fn is_valid(path: &Path) -> bool {
    log_result(path, check(path))
}

/// Whether the live database is structurally sound
pub fn is_live_valid(path: &Path) -> bool {
    log_result(path, check_live(path))
}

fn log_result(path: &Path, result: BackupResult<()>) -> bool {
    match result {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "integrity check passed");
            true
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "integrity check failed");
            false
        }
    }
}

fn check_metadata(path: &Path) -> BackupResult<()> {
    let metadata = fs::metadata(path).map_err(|e| BackupError::integrity(path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(BackupError::integrity(path, "not a regular file"));
    }
    if metadata.len() == 0 {
        return Err(BackupError::integrity(path, "file is empty"));
    }
    Ok(())
}

fn check_database(path: &Path) -> BackupResult<()> {
    let size = fs::metadata(path)?.len();
    if size == 0 {
        return Err(BackupError::integrity(path, "database is empty"));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| BackupError::integrity(path, e.to_string()))?;

    let result: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .map_err(|e| BackupError::integrity(path, e.to_string()))?;

    // Side files can only be removed once the connection is closed
    drop(conn);

    if result == "ok" {
        Ok(())
    } else {
        Err(BackupError::integrity(path, result))
    }
}

/// `-wal` and `-shm` paths belonging to a database file
pub(crate) fn side_files(db: &Path) -> Vec<PathBuf> {
    WAL_SIDE_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut name = db.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        })
        .collect()
}

/// Remove the side files of `db`, except those listed in `keep`
pub(crate) fn remove_side_files(db: &Path, keep: &[PathBuf]) {
    for side in side_files(db) {
        if keep.contains(&side) || !side.exists() {
            continue;
        }
        if let Err(e) = fs::remove_file(&side) {
            tracing::warn!(path = %side.display(), error = %e, "failed to remove side file");
        }
    }
}
