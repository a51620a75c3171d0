//! [`BackupRecord`]: the data-model entity from the specification's §3,
//! persisted as a JSON array (`backup_history.json`) rather than a SQLite
//! table — mirroring the original `SQLiteBackupManager._load_history` /
//! `_save_history` pair (`app/backup.py`), which keeps backup history in a
//! flat JSON file alongside the backup archives themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Incremental,
    Snapshot,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
            Self::Snapshot => "snapshot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupScope {
    Relational,
    Vector,
    Unified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub backup_id: String,
    pub kind: BackupKind,
    pub scope: BackupScope,
    pub path: String,
    pub size: u64,
    pub compressed: bool,
    pub checksum_sha256: String,
    pub retention_days: i64,
    pub expire_at: DateTime<Utc>,
    pub status: BackupStatus,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl BackupRecord {
    pub fn failed(backup_id: String, kind: BackupKind, scope: BackupScope, description: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            backup_id,
            kind,
            scope,
            path: String::new(),
            size: 0,
            compressed: false,
            checksum_sha256: String::new(),
            retention_days: 0,
            expire_at: timestamp,
            status: BackupStatus::Failed,
            description,
            timestamp,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BackupStatus::Completed && self.expire_at < now
    }
}
