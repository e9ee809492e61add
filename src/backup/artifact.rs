//! Backup artifact naming
//!
//! Artifacts are named `todolite_backup_<YYYYMMDD_HHMMSS>.db`, with a `.gz`
//! suffix when compressed. The naming is shared with older installs and must
//! not change.

use std::path::Path;

use chrono::NaiveDateTime;

/// Filename prefix of every artifact
pub const ARTIFACT_PREFIX: &str = "todolite_backup_";

/// Extension of an uncompressed artifact
pub const ARTIFACT_EXT: &str = ".db";

/// Extra suffix of a compressed artifact
pub const GZIP_SUFFIX: &str = ".gz";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Parsed artifact filename
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactName {
    /// Timestamp embedded in the filename (local time)
    pub timestamp: NaiveDateTime,
    /// Whether the artifact is gzip-compressed
    pub compressed: bool,
}

impl ArtifactName {
    pub fn new(timestamp: NaiveDateTime, compressed: bool) -> Self {
        Self {
            timestamp,
            compressed,
        }
    }

    /// Parse a bare filename; anything not matching the convention is `None`
    pub fn parse(filename: &str) -> Option<Self> {
        let rest = filename.strip_prefix(ARTIFACT_PREFIX)?;
        let (stamp, compressed) = match rest.strip_suffix(GZIP_SUFFIX) {
            Some(stem) => (stem.strip_suffix(ARTIFACT_EXT)?, true),
            None => (rest.strip_suffix(ARTIFACT_EXT)?, false),
        };

        // chrono accepts shorter fields than the pattern asks for
        if stamp.len() != 15 || !stamp.bytes().all(|b| b.is_ascii_digit() || b == b'_') {
            return None;
        }

        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self::new(timestamp, compressed))
    }

    /// Filename of the uncompressed artifact for this timestamp
    pub fn db_file_name(&self) -> String {
        format!(
            "{}{}{}",
            ARTIFACT_PREFIX,
            self.timestamp.format(TIMESTAMP_FORMAT),
            ARTIFACT_EXT
        )
    }

    /// Final filename, with `.gz` when compressed
    pub fn file_name(&self) -> String {
        if self.compressed {
            format!("{}{}", self.db_file_name(), GZIP_SUFFIX)
        } else {
            self.db_file_name()
        }
    }
}

/// Whether a path carries the gzip suffix
pub fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Format a timestamp the way artifact names and safety copies embed it
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate, Timelike};

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 27)
            .unwrap()
            .and_hms_opt(14, 30, 22)
            .unwrap()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            ArtifactName::new(stamp(), false).file_name(),
            "todolite_backup_20251127_143022.db"
        );
        assert_eq!(
            ArtifactName::new(stamp(), true).file_name(),
            "todolite_backup_20251127_143022.db.gz"
        );
    }

    #[test]
    fn test_parse() {
        let name = ArtifactName::parse("todolite_backup_20251127_143022.db.gz").unwrap();
        assert!(name.compressed);
        assert_eq!(name.timestamp.year(), 2025);
        assert_eq!(name.timestamp.hour(), 14);

        let name = ArtifactName::parse("todolite_backup_20251127_143022.db").unwrap();
        assert!(!name.compressed);
        assert_eq!(name.timestamp, stamp());
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        for name in [
            "todolite_backup_20251127_143022.db.tmp",
            "todolite_backup_20251127.db",
            "todolite_backup_2025112_1430220.db",
            "todolite_backup_20251327_143022.db",
            "other_backup_20251127_143022.db",
            "todolite_backup_20251127_143022.sqlite",
            "tasks.db",
        ] {
            assert!(ArtifactName::parse(name).is_none(), "{name} should not parse");
        }
    }

    #[test]
    fn test_is_compressed() {
        assert!(is_compressed(Path::new("/b/todolite_backup_20251127_143022.db.gz")));
        assert!(!is_compressed(Path::new("/b/todolite_backup_20251127_143022.db")));
    }
}
