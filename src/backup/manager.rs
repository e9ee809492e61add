//! Backup manager for ToDoLite
//!
//! Owns the live database path, the backup settings and the process-wide lock
//! that serializes every operation touching the live file. Snapshots are byte
//! copies taken under a read transaction (or SQLite's online backup API for
//! WAL databases), written under a temporary name in each destination,
//! optionally gzipped and verified, then renamed into place and followed by
//! per-destination retention pruning.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};
use std::time::SystemTime;

use chrono::{Local, NaiveDateTime, Timelike};
use rusqlite::{Connection, DatabaseName, OpenFlags};

use super::artifact::{ArtifactName, GZIP_SUFFIX};
use super::compress::gzip_file;
use super::destinations;
use super::integrity;
use super::locator::{self, BackupInfo, LatestBackup};
use super::restore::{RestoreManager, RestoreResult};
use crate::config::settings::{BackupSettings, Settings};
use crate::error::{BackupError, BackupResult};

/// How a snapshot of the live database was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SnapshotKind {
    /// Byte copy while holding a shared lock on the live database
    Quiesced,
    /// SQLite online backup API, for WAL databases whose committed pages may
    /// still sit in the `-wal` file
    Online,
    /// Plain byte copy, used when the file cannot be read as a database
    Raw,
}

/// Manages backup creation, retention and restore for one live database
pub struct BackupManager {
    /// Path to the live database file
    db_path: PathBuf,
    /// Config file re-read by `reload_settings`, if any
    config_path: Option<PathBuf>,
    /// Destination used when none are configured
    fallback_destination: Option<PathBuf>,
    /// Current backup settings
    settings: RwLock<BackupSettings>,
    /// Serializes backup writes, restores and live-file checks
    lock: Mutex<()>,
    /// Last timestamp handed out for an artifact name
    last_stamp: Mutex<Option<NaiveDateTime>>,
    restorer: RestoreManager,
}

impl BackupManager {
    /// Create a BackupManager with fixed settings
    pub fn new(db_path: PathBuf, settings: BackupSettings) -> Self {
        tracing::info!(db = %db_path.display(), "backup manager initialized");
        Self {
            restorer: RestoreManager::new(db_path.clone()),
            db_path,
            config_path: None,
            fallback_destination: None,
            settings: RwLock::new(settings),
            lock: Mutex::new(()),
            last_stamp: Mutex::new(None),
        }
    }

    /// Create a BackupManager whose settings come from a config file
    ///
    /// A missing or unparseable file yields default settings.
    pub fn from_config_file(db_path: PathBuf, config_path: PathBuf) -> Self {
        let settings = Settings::load_or_default(&config_path).backup;
        let mut manager = Self::new(db_path, settings);
        manager.config_path = Some(config_path);
        manager
    }

    /// Use `dir` when the settings resolve to no destinations
    pub fn with_fallback_destination(mut self, dir: PathBuf) -> Self {
        self.fallback_destination = Some(dir);
        self
    }

    /// Path to the live database
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Current backup settings
    pub fn settings(&self) -> BackupSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current settings
    pub fn set_settings(&self, settings: BackupSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Re-read settings from the config file, if there is one
    pub fn reload_settings(&self) -> BackupSettings {
        if let Some(path) = &self.config_path {
            self.set_settings(Settings::load_or_default(path).backup);
        }
        self.settings()
    }

    /// Resolved destination directories, highest priority first
    pub fn destinations(&self) -> Vec<PathBuf> {
        self.destinations_for(&self.settings())
    }

    fn destinations_for(&self, settings: &BackupSettings) -> Vec<PathBuf> {
        let resolved = destinations::resolve(settings);
        match (&self.fallback_destination, resolved.is_empty()) {
            (Some(fallback), true) => vec![fallback.clone()],
            _ => resolved,
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a backup in the first destination that accepts it
    ///
    /// Returns the artifact path, or `None` when backups are disabled, the
    /// live database is missing or empty, or every destination failed.
    pub fn create_backup(&self) -> Option<PathBuf> {
        let settings = self.settings();
        let _guard = self.guard();
        let (destinations, name) = self.prepare(&settings)?;

        for dest in &destinations {
            match self.write_to_destination(dest, &name, &settings) {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "backup created");
                    self.prune_destination(dest, settings.max_backups);
                    return Some(path);
                }
                Err(e) => {
                    tracing::error!(destination = %dest.display(), error = %e, "backup to destination failed");
                }
            }
        }

        tracing::error!("backup failed for every destination");
        None
    }

    /// Create a backup in every destination
    ///
    /// A failing destination does not stop the others. Returns the artifacts
    /// that were written; an empty list means the backup failed everywhere
    /// (or was skipped).
    pub fn create_backup_all(&self) -> Vec<PathBuf> {
        let settings = self.settings();
        let _guard = self.guard();
        let Some((destinations, name)) = self.prepare(&settings) else {
            return Vec::new();
        };

        let mut created = Vec::new();
        for dest in &destinations {
            match self.write_to_destination(dest, &name, &settings) {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "backup created");
                    created.push(path);
                    self.prune_destination(dest, settings.max_backups);
                }
                Err(e) => {
                    tracing::error!(destination = %dest.display(), error = %e, "backup to destination failed");
                }
            }
        }

        if created.is_empty() {
            tracing::error!("backup failed for every destination");
        } else {
            tracing::info!(count = created.len(), "backup cycle complete");
        }
        created
    }

    /// Common preconditions of both create operations
    fn prepare(&self, settings: &BackupSettings) -> Option<(Vec<PathBuf>, ArtifactName)> {
        if !settings.enabled {
            tracing::info!("backups are disabled");
            return None;
        }

        let size = fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            tracing::warn!(db = %self.db_path.display(), "database is missing or empty, no backup created");
            return None;
        }

        let destinations = self.destinations_for(settings);
        if destinations.is_empty() {
            tracing::error!("no backup destinations configured");
            return None;
        }

        let name = self.next_artifact_name(&destinations, settings.compress);
        Some((destinations, name))
    }

    /// Pick a timestamp for this cycle that no earlier cycle has used
    fn next_artifact_name(&self, destinations: &[PathBuf], compress: bool) -> ArtifactName {
        let now = Local::now().naive_local();
        let now = now.with_nanosecond(0).unwrap_or(now);
        let one_second = chrono::Duration::seconds(1);

        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut stamp = match *last {
            Some(prev) if prev >= now => prev + one_second,
            _ => now,
        };

        while destinations.iter().any(|dir| name_taken(dir, &stamp)) {
            stamp += one_second;
        }

        *last = Some(stamp);
        ArtifactName::new(stamp, compress)
    }

    fn write_to_destination(
        &self,
        dest: &Path,
        name: &ArtifactName,
        settings: &BackupSettings,
    ) -> BackupResult<PathBuf> {
        fs::create_dir_all(dest).map_err(|e| {
            BackupError::Io(format!("Failed to create directory {}: {}", dest.display(), e))
        })?;

        let final_path = dest.join(name.file_name());
        let staged_db = dest.join(format!("{}.tmp", name.db_file_name()));
        let staged_gz = dest.join(format!("{}{}.tmp", name.db_file_name(), GZIP_SUFFIX));

        let result = self.write_staged(&staged_db, &staged_gz, &final_path, settings.compress);
        if result.is_err() {
            let _ = fs::remove_file(&staged_db);
            let _ = fs::remove_file(&staged_gz);
            integrity::remove_side_files(&staged_db, &[]);
            return result;
        }

        if settings.verify {
            if let Err(e) = integrity::check(&final_path) {
                let _ = fs::remove_file(&final_path);
                return Err(e);
            }
        }

        result
    }

    fn write_staged(
        &self,
        staged_db: &Path,
        staged_gz: &Path,
        final_path: &Path,
        compress: bool,
    ) -> BackupResult<PathBuf> {
        let kind = snapshot_database(&self.db_path, staged_db)?;
        tracing::debug!(snapshot = ?kind, path = %staged_db.display(), "database snapshot written");

        if kind == SnapshotKind::Online || is_wal_database(staged_db) {
            use_rollback_journal(staged_db)?;
        }

        if compress {
            gzip_file(staged_db, staged_gz)?;
            fs::remove_file(staged_db)?;
            fs::rename(staged_gz, final_path)?;
        } else {
            fs::rename(staged_db, final_path)?;
        }

        Ok(final_path.to_path_buf())
    }

    /// Delete the oldest artifacts in `dest` beyond `max_backups`
    ///
    /// Age is modification time, newest kept. `0` keeps everything.
    fn prune_destination(&self, dest: &Path, max_backups: usize) -> Vec<PathBuf> {
        if max_backups == 0 {
            return Vec::new();
        }

        let mut backups: Vec<(SystemTime, BackupInfo)> = locator::scan_dir(dest, 0)
            .into_iter()
            .map(|b| {
                let modified = fs::metadata(&b.path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, b)
            })
            .collect();

        backups.sort_by(|(ma, a), (mb, b)| mb.cmp(ma).then(b.timestamp.cmp(&a.timestamp)));

        let mut deleted = Vec::new();
        for (_, old) in backups.into_iter().skip(max_backups) {
            match fs::remove_file(&old.path) {
                Ok(()) => {
                    tracing::info!(path = %old.path.display(), "removed old backup");
                    deleted.push(old.path);
                }
                Err(e) => {
                    tracing::error!(path = %old.path.display(), error = %e, "failed to remove old backup");
                }
            }
        }
        deleted
    }

    /// Enforce the retention policy in every destination
    pub fn enforce_retention(&self) -> Vec<PathBuf> {
        let settings = self.settings();
        let _guard = self.guard();
        self.destinations_for(&settings)
            .iter()
            .flat_map(|dest| self.prune_destination(dest, settings.max_backups))
            .collect()
    }

    /// List all artifacts across destinations, newest first
    pub fn list_backups(&self) -> Vec<BackupInfo> {
        locator::scan(&self.destinations())
    }

    /// The newest artifact across destinations (not validated)
    pub fn find_latest_backup(&self) -> Option<LatestBackup> {
        locator::find_latest(&self.destinations())
    }

    /// Whether an artifact passes the integrity check
    pub fn validate_backup(&self, path: &Path) -> bool {
        integrity::is_valid(path)
    }

    /// Whether the live database passes the integrity check
    pub fn is_live_database_valid(&self) -> bool {
        let _guard = self.guard();
        integrity::is_live_valid(&self.db_path)
    }

    /// Restore the live database from an artifact, with typed errors
    pub fn try_restore_backup(&self, artifact: &Path) -> BackupResult<RestoreResult> {
        let _guard = self.guard();
        self.restorer.restore_from_file(artifact)
    }

    /// Restore the live database from an artifact
    ///
    /// Returns false on any failure; the live file is then either untouched
    /// or rolled back, unless the rollback itself failed (logged as fatal).
    pub fn restore_backup(&self, artifact: &Path) -> bool {
        match self.try_restore_backup(artifact) {
            Ok(result) => {
                tracing::info!("{}", result.summary());
                true
            }
            Err(e) => {
                log_restore_error(artifact, &e);
                false
            }
        }
    }

    /// Startup self-healing
    ///
    /// Does nothing (returns false) when the live database is valid.
    /// Otherwise restores from the newest artifact, moving on to older ones
    /// only when a newer one fails its integrity check.
    pub fn restore_latest_on_start(&self) -> bool {
        let _guard = self.guard();

        match integrity::check_live(&self.db_path) {
            Ok(()) => {
                tracing::info!("live database is valid, no restore needed");
                return false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "live database is not usable, looking for a backup");
            }
        }

        let candidates = self.list_backups();
        if candidates.is_empty() {
            tracing::warn!("no backups found to restore from");
            return false;
        }

        for candidate in candidates {
            match self.restorer.restore_from_file(&candidate.path) {
                Ok(result) => {
                    tracing::info!("{}", result.summary());
                    return true;
                }
                Err(e @ BackupError::Integrity { .. }) => {
                    tracing::warn!(path = %candidate.path.display(), error = %e, "skipping invalid backup");
                }
                Err(e) => {
                    log_restore_error(&candidate.path, &e);
                    return false;
                }
            }
        }

        tracing::error!("no valid backup found to restore from");
        false
    }
}

fn log_restore_error(artifact: &Path, e: &BackupError) {
    if e.is_fatal() {
        tracing::error!(artifact = %artifact.display(), error = %e, "FATAL: restore left the database in an unknown state");
    } else {
        tracing::error!(artifact = %artifact.display(), error = %e, "restore failed");
    }
}

fn name_taken(dir: &Path, stamp: &NaiveDateTime) -> bool {
    let plain = ArtifactName::new(*stamp, false).file_name();
    let gz = ArtifactName::new(*stamp, true).file_name();
    dir.join(plain).exists() || dir.join(gz).exists()
}

/// Write a consistent copy of `src` to `dst`
///
/// A rollback-journal database is copied byte for byte while a read
/// transaction holds its shared lock, so the host application cannot write
/// mid-copy. A WAL database goes through the online backup API instead, since
/// its committed state is spread over the main file and the `-wal` file.
/// Files that cannot be read as a database are copied as they are.
fn snapshot_database(src: &Path, dst: &Path) -> BackupResult<SnapshotKind> {
    match locked_snapshot(src, dst) {
        Ok(kind) => Ok(kind),
        Err(e) => {
            tracing::warn!(db = %src.display(), error = %e, "database snapshot failed, copying raw file");
            let _ = fs::remove_file(dst);
            integrity::remove_side_files(dst, &[]);
            fs::copy(src, dst).map_err(|e| {
                BackupError::Io(format!("Failed to copy {}: {}", src.display(), e))
            })?;
            Ok(SnapshotKind::Raw)
        }
    }
}

fn locked_snapshot(src: &Path, dst: &Path) -> BackupResult<SnapshotKind> {
    let conn = Connection::open_with_flags(
        src,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if mode.eq_ignore_ascii_case("wal") || is_wal_database(src) {
        conn.backup(DatabaseName::Main, dst, None)?;
        return Ok(SnapshotKind::Online);
    }

    let tx = conn.unchecked_transaction()?;
    tx.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    fs::copy(src, dst)
        .map_err(|e| BackupError::Io(format!("Failed to copy {}: {}", src.display(), e)))?;
    tx.commit()?;
    Ok(SnapshotKind::Quiesced)
}

/// Whether the file header marks a WAL database
fn is_wal_database(path: &Path) -> bool {
    let mut header = [0u8; 20];
    let read = fs::File::open(path).and_then(|mut f| f.read_exact(&mut header));
    read.is_ok()
        && header.starts_with(b"SQLite format 3\0")
        && (header[18] == 2 || header[19] == 2)
}

/// Switch a staged snapshot out of WAL mode
///
/// Artifacts marked WAL make every later reader create `-wal` and `-shm`
/// files next to them.
fn use_rollback_journal(staged: &Path) -> BackupResult<()> {
    {
        let conn = Connection::open(staged)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=DELETE", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("delete") {
            return Err(BackupError::Database(format!(
                "could not leave WAL mode for {} (journal_mode={})",
                staged.display(),
                mode
            )));
        }
    }
    integrity::remove_side_files(staged, &[]);
    Ok(())
}
