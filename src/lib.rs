//! ToDoLite backup engine
//!
//! Keeps rolling snapshots of the ToDoLite task database in one or more
//! destination directories and brings the database back from them when it is
//! lost or damaged.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `backup`: Destination resolution, artifact writing, retention, lookup,
//!   integrity checking and restore
//! - `scheduler`: Background thread running periodic backups
//! - `notify`: Notification sinks for failed backups
//! - `cli`: Command handlers for the `todolite-backup` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use todolite_backup::backup::BackupManager;
//! use todolite_backup::config::AppPaths;
//! use todolite_backup::notify::LogNotifier;
//! use todolite_backup::scheduler::Scheduler;
//!
//! let paths = AppPaths::new()?;
//! let manager = Arc::new(BackupManager::from_config_file(
//!     paths.database_file(),
//!     paths.config_file(),
//! ));
//! manager.restore_latest_on_start();
//!
//! let scheduler = Scheduler::new(manager, Arc::new(LogNotifier));
//! scheduler.start()?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod notify;
pub mod scheduler;

pub use error::{BackupError, BackupResult};
