//! Gzip helpers for backup artifacts

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use crate::error::{BackupError, BackupResult};

/// Compress `src` into a new file at `dst`
///
/// The gzip stream is finished and synced before returning, so the caller may
/// delete `src` as soon as this succeeds.
pub fn gzip_file(src: &Path, dst: &Path) -> BackupResult<u64> {
    let mut input = BufReader::new(File::open(src).map_err(|e| {
        BackupError::Io(format!("Failed to open {}: {}", src.display(), e))
    })?);
    let output = File::create(dst).map_err(|e| {
        BackupError::Io(format!("Failed to create {}: {}", dst.display(), e))
    })?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let copied = io::copy(&mut input, &mut encoder).map_err(|e| {
        BackupError::Io(format!("Failed to compress {}: {}", src.display(), e))
    })?;

    let mut writer = encoder
        .finish()
        .map_err(|e| BackupError::Io(format!("Failed to finish gzip stream: {}", e)))?;
    writer
        .flush()
        .map_err(|e| BackupError::Io(format!("Failed to flush {}: {}", dst.display(), e)))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| BackupError::Io(format!("Failed to sync {}: {}", dst.display(), e)))?;

    Ok(copied)
}

/// Decompress `src` into `writer`
pub fn gunzip_into<W: Write>(src: &Path, writer: &mut W) -> BackupResult<u64> {
    let file = File::open(src)
        .map_err(|e| BackupError::Io(format!("Failed to open {}: {}", src.display(), e)))?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    io::copy(&mut decoder, writer)
        .map_err(|e| BackupError::Io(format!("Failed to decompress {}: {}", src.display(), e)))
}

/// Decompress `src` into a private temporary file
///
/// The file is removed when the returned handle is dropped, including on
/// early returns in the caller.
pub fn gunzip_to_temp(src: &Path) -> BackupResult<NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix("todolite_restore_")
        .suffix(".db")
        .tempfile()
        .map_err(|e| BackupError::Io(format!("Failed to create temp file: {}", e)))?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        gunzip_into(src, &mut writer)?;
        writer
            .flush()
            .map_err(|e| BackupError::Io(format!("Failed to flush temp file: {}", e)))?;
    }

    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_gzip_then_gunzip_to_temp() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("plain.db");
        let dst = temp_dir.path().join("plain.db.gz");
        let content: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        fs::write(&src, &content).unwrap();

        let copied = gzip_file(&src, &dst).unwrap();
        assert_eq!(copied, content.len() as u64);
        assert_ne!(fs::read(&dst).unwrap(), content);

        let temp = gunzip_to_temp(&dst).unwrap();
        assert_eq!(fs::read(temp.path()).unwrap(), content);

        let temp_path = temp.path().to_path_buf();
        drop(temp);
        assert!(!temp_path.exists());
    }

    #[test]
    fn test_gunzip_rejects_plain_file() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("not-gzip.db.gz");
        fs::write(&src, b"definitely not gzip").unwrap();

        assert!(gunzip_to_temp(&src).is_err());
    }
}
