//! Vector-store snapshotter: tars the vector-store directory, optionally
//! gzips the result, and embeds a `backup_metadata.json` member — grounded
//! in `app/backup.py`'s `ChromaDBBackupManager.create_backup`, which does
//! the same `tarfile.open(...).add(chromadb_dir); tar.addfile(metadata)`
//! dance over Python's `tarfile` module.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::BackupError;
use crate::record::{BackupKind, BackupRecord, BackupScope, BackupStatus};

/// Written as the tar archive's `backup_metadata.json` top-level member.
#[derive(Debug, Serialize)]
struct ArchiveMetadata<'a> {
    backup_id: &'a str,
    timestamp: String,
    #[serde(rename = "type")]
    kind: &'a str,
    source_dir: String,
    version: &'static str,
}

const ARCHIVE_VERSION: &str = "1";

pub struct VectorSnapshotter {
    vector_dir: PathBuf,
    backup_root: PathBuf,
}

impl VectorSnapshotter {
    pub fn new(vector_dir: PathBuf, backup_root: PathBuf) -> Self {
        Self { vector_dir, backup_root }
    }

    fn subdir_for(kind: BackupKind) -> &'static str {
        match kind {
            BackupKind::Full => "daily",
            BackupKind::Incremental => "incremental",
            BackupKind::Snapshot => "snapshots",
        }
    }

    pub async fn snapshot(&self, kind: BackupKind, compress: bool, retention_days: i64, description: String) -> Result<BackupRecord, BackupError> {
        let timestamp = Utc::now();
        let backup_id = format!("chromadb_{}", timestamp.format("%Y%m%d_%H%M%S%.f"));
        let subdir = self.backup_root.join("chromadb").join(Self::subdir_for(kind));
        let vector_dir = self.vector_dir.clone();

        if !vector_dir.exists() {
            return Err(BackupError::op("vector_snapshot", format!("vector store directory not found: {}", vector_dir.display())));
        }

        let kind_label = kind.as_str().to_string();
        let id = backup_id.clone();
        let (final_path, size, checksum) = tokio::task::spawn_blocking(move || -> Result<(PathBuf, u64, String), BackupError> {
            std::fs::create_dir_all(&subdir)?;
            let filename = if compress { format!("{id}_{kind_label}.tar.gz") } else { format!("{id}_{kind_label}.tar") };
            let archive_path = subdir.join(filename);

            let metadata = ArchiveMetadata {
                backup_id: &id,
                timestamp: timestamp.to_rfc3339(),
                kind: &kind_label,
                source_dir: vector_dir.to_string_lossy().into_owned(),
                version: ARCHIVE_VERSION,
            };
            let metadata_bytes = serde_json::to_vec_pretty(&metadata).map_err(|e| BackupError::Other(e.into()))?;

            if compress {
                let file = std::fs::File::create(&archive_path)?;
                let encoder = GzEncoder::new(file, Compression::default());
                let mut builder = tar::Builder::new(encoder);
                write_archive(&mut builder, &vector_dir, &metadata_bytes)?;
                builder.into_inner()?.finish()?;
            } else {
                let file = std::fs::File::create(&archive_path)?;
                let mut builder = tar::Builder::new(file);
                write_archive(&mut builder, &vector_dir, &metadata_bytes)?;
                builder.into_inner()?;
            }

            let size = std::fs::metadata(&archive_path)?.len();
            let checksum = sha256_of_file(&archive_path)?;
            Ok((archive_path, size, checksum))
        })
        .await
        .map_err(|e| BackupError::op("vector_snapshot", format!("snapshot task panicked: {e}")))??;

        info!(backup_id = %backup_id, path = %final_path.display(), size, "vector store backup created");

        Ok(BackupRecord {
            backup_id,
            kind,
            scope: BackupScope::Vector,
            path: final_path.to_string_lossy().into_owned(),
            size,
            compressed: compress,
            checksum_sha256: checksum,
            retention_days,
            expire_at: timestamp + chrono::Duration::days(retention_days),
            status: BackupStatus::Completed,
            description,
            timestamp,
        })
    }

    /// Clear `target_dir` and extract `archive_path` into its parent,
    /// mirroring the original's "clear target, extract into parent so the
    /// archive's own `chromadb/` top-level entry lands at `target_dir`".
    pub async fn restore(&self, archive_path: PathBuf, compressed: bool, target_dir: PathBuf) -> Result<(), BackupError> {
        tokio::task::spawn_blocking(move || -> Result<(), BackupError> {
            if target_dir.exists() {
                std::fs::remove_dir_all(&target_dir)?;
            }
            let parent = target_dir.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            std::fs::create_dir_all(&parent)?;

            let file = std::fs::File::open(&archive_path)?;
            if compressed {
                let mut archive = tar::Archive::new(GzDecoder::new(file));
                archive.unpack(&parent)?;
            } else {
                let mut archive = tar::Archive::new(file);
                archive.unpack(&parent)?;
            }
            Ok(())
        })
        .await
        .map_err(|e| BackupError::op("vector_restore", format!("restore task panicked: {e}")))?
    }
}

fn write_archive<W: std::io::Write>(builder: &mut tar::Builder<W>, vector_dir: &Path, metadata_bytes: &[u8]) -> Result<(), BackupError> {
    builder.append_dir_all("chromadb", vector_dir)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(metadata_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, "backup_metadata.json", metadata_bytes)?;
    Ok(())
}

fn sha256_of_file(path: &Path) -> Result<String, BackupError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_and_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vector_dir = dir.path().join("chromadb_live");
        std::fs::create_dir_all(&vector_dir).unwrap();
        std::fs::write(vector_dir.join("index.bin"), b"vector bytes").unwrap();

        let snapshotter = VectorSnapshotter::new(vector_dir.clone(), dir.path().join("backups"));
        let record = snapshotter.snapshot(BackupKind::Snapshot, true, 7, "test".to_string()).await.unwrap();
        assert!(Path::new(&record.path).exists());

        let restore_target = dir.path().join("restored_chromadb");
        snapshotter.restore(PathBuf::from(&record.path), true, restore_target.clone()).await.unwrap();
        let restored_file = restore_target.join("index.bin");
        assert_eq!(std::fs::read(restored_file).unwrap(), b"vector bytes");
    }

    #[tokio::test]
    async fn snapshot_fails_when_vector_dir_missing() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter = VectorSnapshotter::new(dir.path().join("missing"), dir.path().join("backups"));
        let result = snapshotter.snapshot(BackupKind::Snapshot, false, 7, String::new()).await;
        assert!(result.is_err());
    }
}
