//! Configuration module for ToDoLite backups
//!
//! This module provides:
//! - Path resolution for the config file, database and default backup dir
//! - Loading and saving of the `backup` settings section

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{BackupSettings, Settings};
