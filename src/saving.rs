use bincode::{deserialize_from, serialize_into};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::state::Snapshot;

/// Bumped whenever the snapshot layout changes
pub const BACKUP_VERSION: u32 = 1;

/// Suggested file name for a backup taken at `at`
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!("reagentflow-{}.bin.gz", at.format("%Y%m%d-%H%M%S"))
}

#[derive(Debug, Serialize, Deserialize)]
struct BackupFile {
    version: u32,
    created_at: DateTime<Utc>,
    snapshot: Snapshot,
}

fn write_backup<W: Write>(writer: W, snapshot: &Snapshot) -> std::io::Result<()> {
    let encoder = GzEncoder::new(writer, Compression::default());
    let mut writer = BufWriter::new(encoder);
    let file = BackupFile {
        version: BACKUP_VERSION,
        created_at: Utc::now(),
        snapshot: snapshot.clone(),
    };

    serialize_into(&mut writer, &file).map_err(std::io::Error::other)?;

    let encoder = writer.into_inner().map_err(|e| e.into_error())?;
    encoder.finish()?;
    Ok(())
}

fn read_backup<R: Read>(reader: R) -> std::io::Result<Snapshot> {
    let decoder = GzDecoder::new(reader);
    let mut reader = BufReader::new(decoder);

    let file: BackupFile = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    if file.version != BACKUP_VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("unsupported backup version {}", file.version),
        ));
    }
    log::info!("backup from {} loaded", file.created_at.to_rfc3339());
    Ok(file.snapshot)
}

/// Write a gzip-compressed bincode backup to `path`
pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    write_backup(file, snapshot)
}

pub fn load_snapshot(path: &Path) -> std::io::Result<Snapshot> {
    let file = File::open(path)?;
    read_backup(file)
}

/// Serialize a backup into memory, for downloads
pub fn snapshot_to_bytes(snapshot: &Snapshot) -> std::io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_backup(&mut buffer, snapshot)?;
    Ok(buffer)
}

/// Deserialize an uploaded backup
pub fn snapshot_from_bytes(bytes: &[u8]) -> std::io::Result<Snapshot> {
    read_backup(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn garbage_is_rejected() {
        let err = snapshot_from_bytes(b"definitely not gzip").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn file_name_carries_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 5).unwrap();
        assert_eq!(backup_file_name(at), "reagentflow-20250301-093005.bin.gz");
    }
}
