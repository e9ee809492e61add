//! Finding artifacts across destinations
//!
//! Directories that are missing or unreadable are skipped. Nothing here checks
//! integrity; callers validate before trusting a result.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::artifact::ArtifactName;

/// Metadata about one artifact on disk
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    /// Artifact filename
    pub name: String,
    /// Full path to the artifact
    pub path: PathBuf,
    /// Size in bytes (compressed size for `.gz`)
    pub size_bytes: u64,
    /// Timestamp embedded in the filename
    pub timestamp: NaiveDateTime,
    /// Whether the artifact is gzip-compressed
    pub compressed: bool,
    /// Index of the destination it was found in (0 = highest priority)
    pub priority: usize,
}

/// The newest artifact found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestBackup {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
}

/// List every artifact in one destination directory
pub fn scan_dir(dir: &Path, priority: usize) -> Vec<BackupInfo> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if dir.exists() {
                tracing::error!(path = %dir.display(), error = %e, "failed to scan backup directory");
            }
            return Vec::new();
        }
    };

    entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_str()?.to_string();
            let parsed = ArtifactName::parse(&name)?;
            let metadata = entry.metadata().ok()?;
            if !metadata.is_file() {
                return None;
            }

            Some(BackupInfo {
                name,
                path: entry.path(),
                size_bytes: metadata.len(),
                timestamp: parsed.timestamp,
                compressed: parsed.compressed,
                priority,
            })
        })
        .collect()
}

/// List every artifact across all destinations, newest first
///
/// Artifacts with the same timestamp are ordered by destination priority.
pub fn scan(destinations: &[PathBuf]) -> Vec<BackupInfo> {
    let mut backups: Vec<BackupInfo> = destinations
        .iter()
        .enumerate()
        .flat_map(|(priority, dir)| scan_dir(dir, priority))
        .collect();

    backups.sort_by(newest_first);
    backups
}

/// Find the newest artifact across destinations
///
/// Ties on timestamp go to the destination listed first.
pub fn find_latest(destinations: &[PathBuf]) -> Option<LatestBackup> {
    scan(destinations).into_iter().next().map(|b| LatestBackup {
        path: b.path,
        timestamp: b.timestamp,
    })
}

fn newest_first(a: &BackupInfo, b: &BackupInfo) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then(a.priority.cmp(&b.priority))
        .then_with(|| a.name.cmp(&b.name))
}
