use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid object key: {key}")]
    InvalidKey { key: String },

    #[error("No object stored at {key}")]
    NotFound { key: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
