use thiserror::Error;

/// Failure taxonomy for [`super::FileValidator::validate`].
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("rate limit exceeded for client {client_id}: {window}")]
    RateLimitExceeded { client_id: String, window: &'static str },
    #[error("invalid filename: {0}")]
    BadName(String),
    #[error("file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("file is empty")]
    Empty,
    #[error("unsupported file type: {0}")]
    WrongType(String),
    #[error("file signature does not match a supported PDF version")]
    BadSignature,
    #[error("malicious content detected: {0}")]
    Malicious(String),
    #[error("invalid PDF structure: {0}")]
    StructureInvalid(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
