use thiserror::Error;

#[derive(Debug, Error)]
pub enum DuplicateDetectorError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
