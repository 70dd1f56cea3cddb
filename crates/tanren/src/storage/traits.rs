use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::StorageResult;

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    Local { base_path: String },
    Gcs { bucket: String, prefix: String },
}

/// Storage trait for abstract file operations
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if a path exists
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Read file contents
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Write file contents
    async fn write(&self, path: &str, content: &[u8]) -> StorageResult<()>;

    /// Delete a file or directory
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// List entries under a directory
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Create directory
    async fn create_dir(&self, path: &str) -> StorageResult<()>;

    /// Copy file from source to destination
    async fn copy(&self, source: &str, destination: &str) -> StorageResult<()>;

    /// Move file from source to destination
    async fn rename(&self, source: &str, destination: &str) -> StorageResult<()>;

    /// Get file metadata (size, modified time, etc.)
    async fn metadata(&self, path: &str) -> StorageResult<FileMetadata>;
}

/// File metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub is_dir: bool,
}
