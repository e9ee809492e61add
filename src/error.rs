//! Custom error types for the backup engine
//!
//! This module defines the error hierarchy for the crate using thiserror
//! for ergonomic error definitions.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The main error type for backup and restore operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// SQLite errors raised while snapshotting or checking a database
    #[error("Database error: {0}")]
    Database(String),

    /// A database file failed the structural consistency check
    #[error("Integrity check failed for {}: {reason}", path.display())]
    Integrity { path: PathBuf, reason: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// The pre-restore safety copy could not be created
    #[error("Failed to create safety copy {}: {reason}", path.display())]
    SafetyCopy { path: PathBuf, reason: String },

    /// Writing the restored database failed; the live file was rolled back
    #[error("Restore failed, previous database rolled back: {0}")]
    RestoreFailed(String),

    /// Writing the restored database failed and so did the rollback
    #[error(
        "Restore failed and rollback failed, manual recovery needed from {}: {reason}",
        safety_copy.display()
    )]
    RollbackFailed { safety_copy: PathBuf, reason: String },

    /// Notification sink errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Scheduler lifecycle errors
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl BackupError {
    /// Create a "not found" error for backup artifacts
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create an integrity error for a file
    pub fn integrity(path: &Path, reason: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the error leaves the live database in an unknown state
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed { .. })
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<rusqlite::Error> for BackupError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type alias for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BackupError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = BackupError::backup_not_found("latest");
        assert_eq!(err.to_string(), "Backup not found: latest");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_only_rollback_failure_is_fatal() {
        let rollback = BackupError::RollbackFailed {
            safety_copy: PathBuf::from("/data/tasks.db.backup_20250101_000000"),
            reason: "disk full".into(),
        };
        assert!(rollback.is_fatal());
        assert!(rollback.to_string().contains("manual recovery"));

        assert!(!BackupError::RestoreFailed("copy failed".into()).is_fatal());
        assert!(!BackupError::integrity(Path::new("x.db"), "malformed").is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BackupError = io_err.into();
        assert!(matches!(err, BackupError::Io(_)));
    }
}
