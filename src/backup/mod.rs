//! Backup system for ToDoLite
//!
//! Provides rolling snapshots of the live task database into one or more
//! destination directories, with retention, integrity checking and restore.
//!
//! # Architecture
//!
//! - `destinations`: resolves configured directories (env expansion, dedupe)
//! - `integrity`: validates a database file or gzip artifact
//! - `BackupManager`: writes artifacts, prunes, lists and restores
//! - `locator`: finds artifacts and the newest one across destinations
//! - `RestoreManager`: safety copy, staged swap, rollback
//!
//! # Artifact Format
//!
//! Each artifact is a full copy of the database named
//! `todolite_backup_YYYYMMDD_HHMMSS.db`, or the same name with `.gz`
//! appended when compression is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use todolite_backup::backup::BackupManager;
//! use todolite_backup::config::AppPaths;
//!
//! let paths = AppPaths::new()?;
//! let manager = BackupManager::from_config_file(paths.database_file(), paths.config_file());
//!
//! manager.restore_latest_on_start();
//! let written = manager.create_backup_all();
//! ```

pub mod artifact;
pub mod compress;
pub mod destinations;
pub mod integrity;
pub mod locator;
mod manager;
mod restore;

pub use artifact::ArtifactName;
pub use locator::{BackupInfo, LatestBackup};
pub use manager::BackupManager;
pub use restore::{RestoreManager, RestoreResult};
