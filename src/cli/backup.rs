//! Backup CLI commands
//!
//! Implements the commands of the `todolite-backup` binary.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Subcommand;

use crate::backup::{BackupManager, RestoreResult};
use crate::config::paths::AppPaths;
use crate::config::settings::Settings;
use crate::error::{BackupError, BackupResult};
use crate::notify::default_notifier;
use crate::scheduler::Scheduler;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Write to every destination instead of the first one that works
        #[arg(short, long)]
        all: bool,
    },

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the most recent backup
    Latest,

    /// Restore from a backup
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Check that a backup (or any database file) is intact
    Validate {
        /// Backup filename or path
        backup: String,
    },

    /// Restore the newest good backup if the live database is damaged
    Recover,

    /// Run the backup scheduler in the foreground until stdin is closed
    Run {
        /// Run a single backup cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Delete old backups according to the retention policy
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration and paths
    Config,

    /// Manage backup destinations
    #[command(subcommand, alias = "destination")]
    Dest(DestCommands),
}

/// Destination subcommands
#[derive(Subcommand)]
pub enum DestCommands {
    /// Add a destination directory (lowest priority)
    Add { path: String },

    /// Remove a destination directory
    Remove { path: String },
}

/// Files the commands operate on
#[derive(Debug, Clone)]
pub struct CliContext {
    pub paths: AppPaths,
    pub config_file: PathBuf,
    pub database_file: PathBuf,
}

impl CliContext {
    pub fn new(paths: AppPaths, config: Option<PathBuf>, database: Option<PathBuf>) -> Self {
        Self {
            config_file: config.unwrap_or_else(|| paths.config_file()),
            database_file: database.unwrap_or_else(|| paths.database_file()),
            paths,
        }
    }

    fn manager(&self) -> BackupManager {
        BackupManager::from_config_file(self.database_file.clone(), self.config_file.clone())
            .with_fallback_destination(self.paths.default_backup_dir())
    }
}

/// Handle a backup command
pub fn handle_backup_command(ctx: &CliContext, cmd: BackupCommands) -> BackupResult<()> {
    let manager = ctx.manager();

    match cmd {
        BackupCommands::Create { all } => {
            println!("Creating backup...");
            let created = if all {
                manager.create_backup_all()
            } else {
                manager.create_backup().into_iter().collect()
            };

            if created.is_empty() {
                return Err(BackupError::Io(
                    "No backup was created, see the log for details".into(),
                ));
            }
            for path in &created {
                println!("Backup created: {}", file_name(path));
                println!("Location: {}", path.display());
            }
        }

        BackupCommands::List { verbose } => {
            let backups = manager.list_backups();

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: todolite-backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            let now = chrono::Local::now().naive_local();
            for (i, backup) in backups.iter().enumerate() {
                let age_str = format_duration(now.signed_duration_since(backup.timestamp));
                let marker = if backup.compressed { " [gz]" } else { "" };

                if verbose {
                    println!(
                        "{}. {}{}\n   Created: {}\n   Size: {}\n   Age: {}\n   Location: {}\n",
                        i + 1,
                        backup.name,
                        marker,
                        backup.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        format_size(backup.size_bytes),
                        age_str,
                        backup.path.display(),
                    );
                } else {
                    println!(
                        "  {}. {} ({} ago, {}){}",
                        i + 1,
                        backup.name,
                        age_str,
                        format_size(backup.size_bytes),
                        marker,
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Latest => match manager.find_latest_backup() {
            Some(latest) => {
                println!("Latest backup: {}", latest.path.display());
                println!("Created: {}", latest.timestamp.format("%Y-%m-%d %H:%M:%S"));
            }
            None => {
                println!("No backups found.");
            }
        },

        BackupCommands::Restore { backup, force } => {
            let backup_path = resolve_backup_path(&manager, &backup)?;

            println!("Backup Information");
            println!("==================");
            println!("File: {}", backup_path.display());
            if let Ok(metadata) = std::fs::metadata(&backup_path) {
                println!("Size: {}", format_size(metadata.len()));
            }
            let valid = manager.validate_backup(&backup_path);
            println!("Status: {}", if valid { "Valid" } else { "INVALID" });
            println!();

            if !valid {
                return Err(BackupError::integrity(
                    &backup_path,
                    "refusing to restore from a damaged backup",
                ));
            }

            if !force {
                println!("WARNING: This will overwrite the current task database!");
                println!("To proceed, run again with --force flag:");
                println!("  todolite-backup restore {} --force", backup);
                return Ok(());
            }

            println!("Restoring from backup...");
            let result = manager.try_restore_backup(&backup_path)?;
            print_restore_result(&result);
        }

        BackupCommands::Validate { backup } => {
            let backup_path = resolve_backup_path(&manager, &backup)?;
            match crate::backup::integrity::check(&backup_path) {
                Ok(()) => println!("{}: OK", backup_path.display()),
                Err(e) => {
                    println!("{}: INVALID", backup_path.display());
                    return Err(e);
                }
            }
        }

        BackupCommands::Recover => {
            if manager.restore_latest_on_start() {
                println!("Database restored from the latest valid backup.");
            } else if manager.is_live_database_valid() {
                println!("Database is valid, nothing to recover.");
            } else {
                return Err(BackupError::RestoreFailed(
                    "database is damaged and no backup could be restored".into(),
                ));
            }
        }

        BackupCommands::Run { once } => {
            if once {
                let created = manager.create_backup_all();
                if created.is_empty() {
                    return Err(BackupError::Io(
                        "Backup cycle failed for every destination".into(),
                    ));
                }
                println!("Backup cycle wrote {} artifact(s).", created.len());
                return Ok(());
            }

            let scheduler = Scheduler::new(Arc::new(manager), Arc::from(default_notifier()));
            scheduler.start()?;
            let status = scheduler.status();
            println!(
                "Backup scheduler running every {} hour(s). Close stdin (Ctrl-D) to stop.",
                status.interval_hours
            );

            let mut sink = Vec::new();
            if let Err(e) = io::stdin().lock().read_to_end(&mut sink) {
                tracing::warn!(error = %e, "stdin closed with an error");
            }

            scheduler.stop();
            println!("Backup scheduler stopped.");
        }

        BackupCommands::Prune { force } => {
            let settings = manager.settings();
            let backups = manager.list_backups();
            let destinations = manager.destinations();

            println!("Prune Summary");
            println!("=============");
            if settings.max_backups == 0 {
                println!("Retention policy: keep everything");
            } else {
                println!("Retention policy: {} per destination", settings.max_backups);
            }
            println!(
                "Current backups: {} across {} destination(s)",
                backups.len(),
                destinations.len()
            );
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  todolite-backup prune --force");
                return Ok(());
            }

            let deleted = manager.enforce_retention();
            println!("Deleted {} backup(s).", deleted.len());
        }

        BackupCommands::Config => {
            let settings = manager.settings();
            println!("ToDoLite Backup Configuration");
            println!("=============================");
            println!("Config file:   {}", ctx.config_file.display());
            println!("Database:      {}", ctx.database_file.display());
            println!();
            println!("Settings:");
            println!("  Enabled:     {}", settings.enabled);
            println!("  Interval:    {} hour(s)", settings.interval_hours);
            println!("  Max backups: {}", settings.max_backups);
            println!("  Compress:    {}", settings.compress);
            println!("  Verify:      {}", settings.verify);
            println!();
            println!("Destinations (highest priority first):");
            for (i, dest) in manager.destinations().iter().enumerate() {
                let state = if dest.is_dir() { "" } else { " (not created yet)" };
                println!("  {}. {}{}", i + 1, dest.display(), state);
            }
        }

        BackupCommands::Dest(cmd) => handle_dest_command(ctx, cmd)?,
    }

    Ok(())
}

fn handle_dest_command(ctx: &CliContext, cmd: DestCommands) -> BackupResult<()> {
    let mut settings = if ctx.config_file.exists() {
        Settings::load(&ctx.config_file)?
    } else {
        Settings::default()
    };

    match cmd {
        DestCommands::Add { path } => {
            if settings.backup.add_destination(path.clone()) {
                settings.save(&ctx.config_file)?;
                println!("Added destination: {}", path);
            } else {
                println!("Destination already configured: {}", path);
            }
        }
        DestCommands::Remove { path } => {
            if settings.backup.remove_destination(&path) {
                settings.save(&ctx.config_file)?;
                println!("Removed destination: {}", path);
            } else {
                return Err(BackupError::NotFound {
                    entity_type: "Destination",
                    identifier: path,
                });
            }
        }
    }

    Ok(())
}

fn print_restore_result(result: &RestoreResult) {
    println!("Restore complete!");
    println!("{}", result.summary());
    if !result.safety_copy_removed {
        println!("\nNote: the safety copy of the previous database could not be removed.");
    }
}

/// Resolve a backup identifier to a full path
fn resolve_backup_path(manager: &BackupManager, backup: &str) -> BackupResult<PathBuf> {
    if backup.eq_ignore_ascii_case("latest") {
        return manager
            .find_latest_backup()
            .map(|b| b.path)
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }

    let path = PathBuf::from(backup);
    if path.exists() {
        return Ok(path);
    }

    // A bare filename is looked up in each destination, in priority order
    manager
        .destinations()
        .into_iter()
        .map(|dir| dir.join(backup))
        .find(|candidate| candidate.exists())
        .ok_or_else(|| BackupError::backup_not_found(backup))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
