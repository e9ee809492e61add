//! User settings for ToDoLite backups
//!
//! The application keeps one `config.json`. Only its `backup` section belongs
//! to this crate; every other top-level key is carried through untouched so
//! saving never drops the rest of the application's configuration.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupResult};

const DEFAULT_INTERVAL_HOURS: f64 = 1.0;
const DEFAULT_MAX_BACKUPS: usize = 10;
/// One year; longer intervals are clamped to this
const MAX_INTERVAL_HOURS: f64 = 24.0 * 365.0;

/// Backup configuration, always in its canonical shape
///
/// Older config files describe destinations as `primary_paths` plus a single
/// `fallback_path`. Those are folded into `destinations` while deserializing,
/// so nothing past this type ever sees the legacy layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBackupSettings")]
pub struct BackupSettings {
    /// Whether scheduled and manual backups run at all
    pub enabled: bool,
    /// Hours between scheduled backups
    pub interval_hours: f64,
    /// Destination directories, highest priority first
    pub destinations: Vec<String>,
    /// Artifacts kept per destination (0 keeps everything)
    pub max_backups: usize,
    /// Gzip artifacts after writing them
    pub compress: bool,
    /// Run the integrity check on every artifact right after writing it
    pub verify: bool,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: DEFAULT_INTERVAL_HOURS,
            destinations: Vec::new(),
            max_backups: DEFAULT_MAX_BACKUPS,
            compress: true,
            verify: true,
        }
    }
}

/// On-disk shape of the `backup` section, modern and legacy fields alike
#[derive(Debug, Default, Deserialize)]
struct RawBackupSettings {
    enabled: Option<bool>,
    interval_hours: Option<f64>,
    #[serde(default)]
    destinations: Vec<Option<String>>,
    #[serde(default)]
    primary_paths: Vec<Option<String>>,
    fallback_path: Option<String>,
    max_backups: Option<f64>,
    compress: Option<bool>,
    verify: Option<bool>,
}

impl From<RawBackupSettings> for BackupSettings {
    fn from(raw: RawBackupSettings) -> Self {
        let defaults = BackupSettings::default();

        let mut destinations: Vec<String> = Vec::new();
        let legacy = raw.primary_paths.into_iter().chain(std::iter::once(raw.fallback_path));
        for path in raw.destinations.into_iter().chain(legacy).flatten() {
            let path = path.trim().to_string();
            if !path.is_empty() && !destinations.contains(&path) {
                destinations.push(path);
            }
        }

        let interval_hours = raw
            .interval_hours
            .filter(|h| h.is_finite() && *h > 0.0)
            .map(|h| h.min(MAX_INTERVAL_HOURS))
            .unwrap_or(defaults.interval_hours);

        Self {
            enabled: raw.enabled.unwrap_or(defaults.enabled),
            interval_hours,
            destinations,
            max_backups: raw
                .max_backups
                .filter(|n| n.is_finite())
                .map(|n| n.max(0.0).trunc() as usize)
                .unwrap_or(defaults.max_backups),
            compress: raw.compress.unwrap_or(defaults.compress),
            verify: raw.verify.unwrap_or(defaults.verify),
        }
    }
}

impl BackupSettings {
    /// Time between two scheduled backups
    ///
    /// Values that do not fit a `Duration` (set directly on the struct rather
    /// than loaded) count as one hour.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_hours * 3600.0)
            .unwrap_or(Duration::from_secs_f64(DEFAULT_INTERVAL_HOURS * 3600.0))
    }

    /// Append a destination; returns false when it is already configured
    pub fn add_destination(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if path.trim().is_empty() || self.destinations.contains(&path) {
            return false;
        }
        self.destinations.push(path);
        true
    }

    /// Remove a destination; returns false when it was not configured
    pub fn remove_destination(&mut self, path: &str) -> bool {
        let before = self.destinations.len();
        self.destinations.retain(|d| d != path);
        self.destinations.len() != before
    }
}

/// The application's configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Backup section
    #[serde(default)]
    pub backup: BackupSettings,

    /// Remaining application settings, preserved verbatim
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl Settings {
    /// Load settings from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or not valid JSON.
    pub fn load(path: &Path) -> BackupResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        // Files written by Windows editors often carry a BOM.
        let contents = contents.trim_start_matches('\u{feff}');

        serde_json::from_str(contents).map_err(|e| {
            BackupError::Config(format!(
                "Failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load settings, falling back to defaults on any error
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                if path.exists() {
                    tracing::error!(path = %path.display(), error = %e, "using default settings");
                } else {
                    tracing::info!(path = %path.display(), "settings file not found, using defaults");
                }
                Self::default()
            }
        }
    }

    /// Save settings to disk (write to temp, then rename)
    pub fn save(&self, path: &Path) -> BackupResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackupError::Io(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let temp_path = path.with_extension("json.tmp");
        let file = File::create(&temp_path)
            .map_err(|e| BackupError::Io(format!("Failed to create temp file: {}", e)))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| BackupError::Config(format!("Failed to serialize settings: {}", e)))?;
        writer
            .flush()
            .map_err(|e| BackupError::Io(format!("Failed to flush settings: {}", e)))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| BackupError::Io(format!("Failed to sync settings: {}", e)))?;

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            BackupError::Io(format!("Failed to rename temp file: {}", e))
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = BackupSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.interval_hours, 1.0);
        assert_eq!(settings.max_backups, 10);
        assert!(settings.compress);
        assert!(settings.destinations.is_empty());
    }

    #[test]
    fn test_legacy_paths_appended_after_destinations() {
        let json = r#"{
            "enabled": true,
            "destinations": ["/mnt/a", "/mnt/b"],
            "primary_paths": ["/mnt/b", "/mnt/c"],
            "fallback_path": "/mnt/d"
        }"#;
        let settings: BackupSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.destinations, vec!["/mnt/a", "/mnt/b", "/mnt/c", "/mnt/d"]);
    }

    #[test]
    fn test_legacy_only_config() {
        let json = r#"{"primary_paths": ["/p1", ""], "fallback_path": "/fb"}"#;
        let settings: BackupSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.destinations, vec!["/p1", "/fb"]);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let json = r#"{"interval_hours": -3, "max_backups": -1}"#;
        let settings: BackupSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.interval_hours, 1.0);
        assert_eq!(settings.max_backups, 0);
    }

    #[test]
    fn test_huge_interval_is_clamped() {
        let settings: BackupSettings = serde_json::from_str(r#"{"interval_hours": 1e300}"#).unwrap();
        assert_eq!(settings.interval_hours, MAX_INTERVAL_HOURS);
        assert_eq!(settings.interval(), Duration::from_secs(365 * 24 * 3600));

        let direct = BackupSettings {
            interval_hours: 1e300,
            ..BackupSettings::default()
        };
        assert_eq!(direct.interval(), Duration::from_secs(3600));

        let negative = BackupSettings {
            interval_hours: -2.0,
            ..BackupSettings::default()
        };
        assert_eq!(negative.interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_float_max_backups_is_accepted() {
        let json = r#"{"destinations": ["/mnt/b1"], "max_backups": 10.0}"#;
        let settings: BackupSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.max_backups, 10);
        assert_eq!(settings.destinations, vec!["/mnt/b1"]);

        let settings: BackupSettings = serde_json::from_str(r#"{"max_backups": 4.7}"#).unwrap();
        assert_eq!(settings.max_backups, 4);

        let settings: BackupSettings = serde_json::from_str(r#"{"max_backups": 7}"#).unwrap();
        assert_eq!(settings.max_backups, 7);
    }

    #[test]
    fn test_save_and_load_preserves_other_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"version": "1.5.2", "auth": {"enabled": false}, "backup": {"compress": false}}"#,
        )
        .unwrap();

        let mut settings = Settings::load(&path).unwrap();
        assert!(!settings.backup.compress);
        settings.backup.add_destination("/mnt/backups");
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.backup.destinations, vec!["/mnt/backups"]);
        assert_eq!(loaded.other["version"], "1.5.2");
        assert!(loaded.other.contains_key("auth"));
        assert!(!temp_dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let settings = Settings::load_or_default(&path);
        assert_eq!(settings.backup, BackupSettings::default());

        let missing = Settings::load_or_default(&temp_dir.path().join("missing.json"));
        assert_eq!(missing.backup, BackupSettings::default());
    }

    #[test]
    fn test_load_strips_bom() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "\u{feff}{\"backup\": {\"max_backups\": 3}}").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.backup.max_backups, 3);
    }

    #[test]
    fn test_add_and_remove_destination() {
        let mut settings = BackupSettings::default();
        assert!(settings.add_destination("/a"));
        assert!(!settings.add_destination("/a"));
        assert!(!settings.add_destination("  "));
        assert!(settings.remove_destination("/a"));
        assert!(!settings.remove_destination("/a"));
    }
}
