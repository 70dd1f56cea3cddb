use thiserror::Error;

/// Dataset related errors
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("Dataset already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid sample format: {0}")]
    InvalidFormat(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] crate::storage::StorageError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;
