use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use todolite_backup::cli::{handle_backup_command, BackupCommands, CliContext};
use todolite_backup::config::AppPaths;

#[derive(Parser)]
#[command(
    name = "todolite-backup",
    version,
    about = "Backup and recovery for the ToDoLite task database",
    long_about = "Creates rolling, optionally compressed snapshots of the ToDoLite \
                  task database in one or more directories, prunes old ones, and \
                  restores the database from them with a safety copy and rollback."
)]
struct Cli {
    /// Path to config.json (defaults to the data directory)
    #[arg(long, global = true, env = "TODOLITE_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the live database (defaults to tasks.db in the data directory)
    #[arg(long, global = true, env = "TODOLITE_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: BackupCommands,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let paths = AppPaths::new()?;
    paths.ensure_directories()?;
    let ctx = CliContext::new(paths, cli.config, cli.database);

    handle_backup_command(&ctx, cli.command)?;

    Ok(())
}
