use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup operation '{operation}' failed: {cause}")]
    Operation { operation: &'static str, cause: String },
    #[error("backup not found: {0}")]
    NotFound(String),
    #[error("backup {0} is not in a restorable state")]
    NotRestorable(String),
    #[error("checksum mismatch for backup {backup_id}: expected {expected}, got {actual}")]
    ChecksumMismatch { backup_id: String, expected: String, actual: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BackupError {
    pub fn op(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Operation { operation, cause: cause.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ConsistencyError {
    #[error("relational store error: {0}")]
    Relational(#[from] diesel::result::Error),
    #[error("vector store error: {0}")]
    VectorStore(#[from] ingest_core::vector_store::VectorStoreError),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expr}': {cause}")]
    InvalidCron { expr: String, cause: String },
    #[error("job '{0}' is already running")]
    AlreadyRunning(String),
    #[error("scheduler has been stopped")]
    Stopped,
}
