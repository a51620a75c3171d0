use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("job store error: {0}")]
    JobStore(#[from] crate::jobs::store::JobStoreError),
    #[error("duplicate detector error: {0}")]
    DuplicateDetector(#[from] crate::dedup::DuplicateDetectorError),
    #[error("vector store error: {0}")]
    VectorStore(#[from] crate::vector_store::VectorStoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
