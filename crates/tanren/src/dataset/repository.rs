use async_trait::async_trait;

use super::{Dataset, DatasetId, Result};

/// Repository trait for datasets
#[async_trait]
pub trait DatasetRepository: Send + Sync {
    /// Create a new dataset entry
    async fn create(&self, dataset: Dataset) -> Result<Dataset>;

    /// Get a dataset by ID
    async fn get(&self, id: &DatasetId) -> Result<Option<Dataset>>;

    /// Get a dataset by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Dataset>>;

    /// List all datasets
    async fn list(&self) -> Result<Vec<Dataset>>;

    /// Update a dataset
    async fn update(&self, dataset: Dataset) -> Result<Dataset>;

    /// Delete a dataset
    async fn delete(&self, id: &DatasetId) -> Result<()>;

    /// Check if a dataset exists
    async fn exists(&self, id: &DatasetId) -> Result<bool>;
}
