use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dataset ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(Uuid);

impl DatasetId {
    /// Create a new dataset ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from string
    pub fn from_string(s: &str) -> Self {
        Self(Uuid::parse_str(s).unwrap_or_else(|_| Uuid::new_v4()))
    }
}

impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An instruction dataset tracked by the registry
///
/// The samples live as one jsonl file under the datasets directory;
/// `file_path` points at it once the dataset has been fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique identifier
    pub id: DatasetId,
    /// Name of the dataset
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// HuggingFace dataset repo ID
    pub repo_id: Option<String>,
    /// Split the samples came from
    pub split: String,
    /// File path in storage
    pub file_path: Option<String>,
    /// Number of samples in the file
    pub sample_count: Option<usize>,
    /// File size in bytes
    pub size_bytes: Option<u64>,
    /// SHA-256 hash of the data
    pub hash: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
}

impl Dataset {
    /// Create a new dataset instance
    pub fn new(
        name: String,
        description: Option<String>,
        repo_id: Option<String>,
        split: String,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: DatasetId::new(),
            name,
            description,
            repo_id,
            split,
            file_path: None,
            sample_count: None,
            size_bytes: None,
            hash: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
