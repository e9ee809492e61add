//! Backup restoration
//!
//! Replaces the live database with the contents of an artifact. The artifact
//! is validated first, the live file is copied to a safety copy, and the new
//! contents are staged next to the live file and renamed over it. If staging
//! fails the safety copy is put back. Only a failed rollback is fatal.
//!
//! Callers are expected to hold the manager's lock; this type does not lock.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use super::artifact::{format_timestamp, is_compressed};
use super::compress::gunzip_to_temp;
use super::integrity;
use crate::error::{BackupError, BackupResult};

/// SQLite side files that belong to the replaced database
const SIDE_FILE_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

/// Handles restoring the live database from artifacts
pub struct RestoreManager {
    db_path: PathBuf,
}

impl RestoreManager {
    /// Create a new RestoreManager for the live database at `db_path`
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Restore the live database from an artifact (`.db` or `.db.gz`)
    ///
    /// # Errors
    ///
    /// - `NotFound` / `Integrity`: nothing was touched
    /// - `SafetyCopy`: the live file could not be protected, nothing was touched
    /// - `RestoreFailed`: the swap failed and the live file was rolled back
    /// - `RollbackFailed`: fatal, the safety copy is left on disk
    pub fn restore_from_file(&self, artifact: &Path) -> BackupResult<RestoreResult> {
        self.restore_with(artifact, replace_file)
    }

    /// Restore with a custom final swap step
    fn restore_with<F>(&self, artifact: &Path, swap: F) -> BackupResult<RestoreResult>
    where
        F: FnOnce(&Path, &Path) -> BackupResult<u64>,
    {
        tracing::info!(artifact = %artifact.display(), "starting restore");

        if !artifact.is_file() {
            return Err(BackupError::backup_not_found(artifact.display().to_string()));
        }

        integrity::check(artifact)?;

        let safety_copy = self.create_safety_copy()?;

        let swapped = if is_compressed(artifact) {
            gunzip_to_temp(artifact).and_then(|temp| swap(temp.path(), &self.db_path))
        } else {
            swap(artifact, &self.db_path)
        };

        match swapped {
            Ok(bytes_restored) => {
                self.remove_side_files();
                let safety_copy_removed = safety_copy
                    .as_deref()
                    .map_or(true, remove_safety_copy);

                tracing::info!(
                    artifact = %artifact.display(),
                    bytes = bytes_restored,
                    "database restored"
                );

                Ok(RestoreResult {
                    artifact: artifact.to_path_buf(),
                    bytes_restored,
                    safety_copy_removed,
                })
            }
            Err(e) => {
                tracing::error!(artifact = %artifact.display(), error = %e, "restore failed, rolling back");
                match safety_copy {
                    Some(safety_copy) => self.rollback(&safety_copy, e),
                    None => Err(BackupError::RestoreFailed(e.to_string())),
                }
            }
        }
    }

    /// Copy the live file to a timestamped sibling
    ///
    /// Returns `None` when there is no live file to protect.
    fn create_safety_copy(&self) -> BackupResult<Option<PathBuf>> {
        if !self.db_path.exists() {
            tracing::warn!(path = %self.db_path.display(), "no live database, skipping safety copy");
            return Ok(None);
        }

        let path = self.safety_copy_path();
        fs::copy(&self.db_path, &path).map_err(|e| BackupError::SafetyCopy {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        tracing::info!(path = %path.display(), "created safety copy");
        Ok(Some(path))
    }

    fn safety_copy_path(&self) -> PathBuf {
        let stamp = format_timestamp(&Local::now().naive_local());
        let base = format!("{}.backup_{}", self.db_path.display(), stamp);

        let mut candidate = PathBuf::from(&base);
        let mut n = 1;
        while candidate.exists() {
            candidate = PathBuf::from(format!("{}_{}", base, n));
            n += 1;
        }
        candidate
    }

    fn rollback(&self, safety_copy: &Path, cause: BackupError) -> BackupResult<RestoreResult> {
        match replace_file(safety_copy, &self.db_path) {
            Ok(_) => {
                tracing::warn!(
                    safety_copy = %safety_copy.display(),
                    "previous database put back from safety copy"
                );
                remove_safety_copy(safety_copy);
                Err(BackupError::RestoreFailed(cause.to_string()))
            }
            Err(rollback_err) => {
                tracing::error!(
                    safety_copy = %safety_copy.display(),
                    live = %self.db_path.display(),
                    error = %rollback_err,
                    cause = %cause,
                    "FATAL: restore and rollback both failed, live database may be inconsistent"
                );
                Err(BackupError::RollbackFailed {
                    safety_copy: safety_copy.to_path_buf(),
                    reason: format!("{}; rollback: {}", cause, rollback_err),
                })
            }
        }
    }

    fn remove_side_files(&self) {
        for suffix in SIDE_FILE_SUFFIXES {
            let side = PathBuf::from(format!("{}{}", self.db_path.display(), suffix));
            if side.exists() {
                if let Err(e) = fs::remove_file(&side) {
                    tracing::warn!(path = %side.display(), error = %e, "failed to remove stale side file");
                }
            }
        }
    }
}

fn remove_safety_copy(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed safety copy");
            true
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove safety copy");
            false
        }
    }
}

/// Replace `dst` with the bytes of `src` via a staged sibling and a rename
///
/// `dst` is never left partially written: it is either untouched or fully
/// replaced.
fn replace_file(src: &Path, dst: &Path) -> BackupResult<u64> {
    let parent = match dst.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".todolite_restore_")
        .suffix(".tmp")
        .tempfile_in(&parent)
        .map_err(|e| BackupError::Io(format!("Failed to stage restore: {}", e)))?;

    let mut input = BufReader::new(
        File::open(src)
            .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", src.display(), e)))?,
    );
    let copied = io::copy(&mut input, staged.as_file_mut())
        .map_err(|e| BackupError::Io(format!("Failed to write restored data: {}", e)))?;
    staged
        .as_file_mut()
        .flush()
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| BackupError::Io(format!("Failed to sync restored data: {}", e)))?;

    staged
        .persist(dst)
        .map_err(|e| BackupError::Io(format!("Failed to replace {}: {}", dst.display(), e.error)))?;

    Ok(copied)
}

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreResult {
    /// Artifact the database was restored from
    pub artifact: PathBuf,
    /// Bytes written to the live database
    pub bytes_restored: u64,
    /// Whether the safety copy was cleaned up
    pub safety_copy_removed: bool,
}

impl RestoreResult {
    /// Get a summary of the restore
    pub fn summary(&self) -> String {
        let name = self
            .artifact
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.artifact.display().to_string());
        format!("Restored {} bytes from {}", self.bytes_restored, name)
    }
}
