//! Backup history: an in-process cache over `backups/metadata/backup_history.json`,
//! following the original `_load_history`/`_save_history`/`_add_to_history`
//! trio in `app/backup.py` — load once at startup, append/update in memory,
//! rewrite the whole file on every mutation (history sizes are bounded by
//! `backup_history_cap`, so a full rewrite is cheap).

use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::warn;

use crate::error::BackupError;
use crate::record::BackupRecord;

pub struct BackupHistory {
    path: PathBuf,
    records: RwLock<Vec<BackupRecord>>,
    cap: usize,
}

impl BackupHistory {
    /// Load `path` if it exists, starting from an empty history otherwise.
    pub async fn load(path: PathBuf, cap: usize) -> Result<Self, BackupError> {
        let records = if path.exists() {
            let raw = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, path = %path.display(), "backup history file was unreadable, starting fresh");
                Vec::new()
            })
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            Vec::new()
        };
        Ok(Self { path, records: RwLock::new(records), cap })
    }

    async fn persist(&self, records: &[BackupRecord]) -> Result<(), BackupError> {
        let json = serde_json::to_string_pretty(records).map_err(|e| BackupError::Other(e.into()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Append `record`, then trim to `cap` oldest-first, mirroring the
    /// specification's "keep records to a cap (e.g. last 1000)".
    pub async fn insert(&self, record: BackupRecord) -> Result<(), BackupError> {
        let mut records = self.records.write().await;
        records.push(record);
        if records.len() > self.cap {
            let overflow = records.len() - self.cap;
            records.drain(0..overflow);
        }
        self.persist(&records).await
    }

    pub async fn by_id(&self, backup_id: &str) -> Option<BackupRecord> {
        self.records.read().await.iter().find(|r| r.backup_id == backup_id).cloned()
    }

    pub async fn all(&self) -> Vec<BackupRecord> {
        self.records.read().await.clone()
    }

    pub async fn recent(&self, limit: usize) -> Vec<BackupRecord> {
        let records = self.records.read().await;
        records.iter().rev().take(limit).cloned().collect()
    }

    /// Remove every record whose status is `completed` and whose
    /// `expire_at` has passed; deletes the backing file for each and
    /// returns the removed records so the caller can log what was purged.
    pub async fn sweep_expired(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<BackupRecord>, BackupError> {
        let mut records = self.records.write().await;
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *records).into_iter().partition(|r| r.is_expired(now));
        *records = kept;
        for record in &expired {
            let path = Path::new(&record.path);
            if path.exists() {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(error = %e, path = %record.path, "failed to remove expired backup file");
                }
            }
        }
        self.persist(&records).await?;
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BackupKind, BackupScope, BackupStatus};
    use chrono::Utc;

    fn sample(id: &str, expire_at: chrono::DateTime<chrono::Utc>) -> BackupRecord {
        BackupRecord {
            backup_id: id.to_string(),
            kind: BackupKind::Snapshot,
            scope: BackupScope::Relational,
            path: String::new(),
            size: 0,
            compressed: false,
            checksum_sha256: String::new(),
            retention_days: 1,
            expire_at,
            status: BackupStatus::Completed,
            description: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup_history.json");
        let history = BackupHistory::load(path.clone(), 1000).await.unwrap();
        history.insert(sample("b1", Utc::now() + chrono::Duration::days(1))).await.unwrap();

        let reloaded = BackupHistory::load(path, 1000).await.unwrap();
        assert_eq!(reloaded.all().await.len(), 1);
        assert!(reloaded.by_id("b1").await.is_some());
    }

    #[tokio::test]
    async fn cap_trims_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let history = BackupHistory::load(dir.path().join("h.json"), 2).await.unwrap();
        for i in 0..3 {
            history.insert(sample(&format!("b{i}"), Utc::now() + chrono::Duration::days(1))).await.unwrap();
        }
        let all = history.all().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].backup_id, "b1");
        assert_eq!(all[1].backup_id, "b2");
    }

    #[tokio::test]
    async fn sweep_expired_removes_only_expired_completed_records() {
        let dir = tempfile::tempdir().unwrap();
        let history = BackupHistory::load(dir.path().join("h.json"), 1000).await.unwrap();
        let now = Utc::now();
        history.insert(sample("expired", now - chrono::Duration::days(1))).await.unwrap();
        history.insert(sample("fresh", now + chrono::Duration::days(1))).await.unwrap();

        let removed = history.sweep_expired(now).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].backup_id, "expired");
        assert_eq!(history.all().await.len(), 1);
    }
}
