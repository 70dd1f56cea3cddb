use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Dataset, DatasetError, DatasetId, DatasetRepository, Result};

/// In-memory implementation of DatasetRepository
#[derive(Clone)]
pub struct InMemoryDatasetRepository {
    datasets: Arc<RwLock<HashMap<DatasetId, Dataset>>>,
}

impl InMemoryDatasetRepository {
    /// Create a new in-memory dataset repository
    pub fn new() -> Self {
        Self {
            datasets: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryDatasetRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatasetRepository for InMemoryDatasetRepository {
    async fn create(&self, dataset: Dataset) -> Result<Dataset> {
        let mut datasets = self.datasets.write().await;

        // Check if name already exists
        for existing in datasets.values() {
            if existing.name == dataset.name {
                return Err(DatasetError::AlreadyExists(dataset.name));
            }
        }

        let id = dataset.id.clone();
        datasets.insert(id, dataset.clone());
        Ok(dataset)
    }

    async fn get(&self, id: &DatasetId) -> Result<Option<Dataset>> {
        let datasets = self.datasets.read().await;
        Ok(datasets.get(id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Dataset>> {
        let datasets = self.datasets.read().await;
        Ok(datasets.values().find(|d| d.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<Dataset>> {
        let datasets = self.datasets.read().await;
        Ok(datasets.values().cloned().collect())
    }

    async fn update(&self, dataset: Dataset) -> Result<Dataset> {
        let mut datasets = self.datasets.write().await;

        if !datasets.contains_key(&dataset.id) {
            return Err(DatasetError::NotFound(dataset.id.to_string()));
        }

        // Check if name conflicts with other datasets
        for (existing_id, existing) in datasets.iter() {
            if existing.name == dataset.name && existing_id != &dataset.id {
                return Err(DatasetError::AlreadyExists(dataset.name));
            }
        }

        datasets.insert(dataset.id.clone(), dataset.clone());
        Ok(dataset)
    }

    async fn delete(&self, id: &DatasetId) -> Result<()> {
        let mut datasets = self.datasets.write().await;

        if datasets.remove(id).is_none() {
            return Err(DatasetError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn exists(&self, id: &DatasetId) -> Result<bool> {
        let datasets = self.datasets.read().await;
        Ok(datasets.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dataset(name: &str) -> Dataset {
        Dataset::new(
            name.to_string(),
            Some("Instruction dataset".to_string()),
            Some("databricks/databricks-dolly-15k".to_string()),
            "train".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryDatasetRepository::new();
        let dataset = test_dataset("dolly-15k");
        let id = dataset.id.clone();

        let created = repo.create(dataset).await.unwrap();
        assert_eq!(created.name, "dolly-15k");
        assert_eq!(created.split, "train");

        let retrieved = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "dolly-15k");
        assert!(repo.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let repo = InMemoryDatasetRepository::new();
        repo.create(test_dataset("dolly-15k")).await.unwrap();

        let result = repo.create(test_dataset("dolly-15k")).await;
        assert!(matches!(result, Err(DatasetError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_get_by_name() {
        let repo = InMemoryDatasetRepository::new();
        let dataset = test_dataset("dolly-15k");
        repo.create(dataset.clone()).await.unwrap();

        let found = repo.get_by_name("dolly-15k").await.unwrap().unwrap();
        assert_eq!(found.id, dataset.id);

        assert!(repo.get_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = InMemoryDatasetRepository::new();
        let mut dataset = test_dataset("dolly-15k");
        repo.create(dataset.clone()).await.unwrap();

        dataset.sample_count = Some(1000);
        dataset.hash = Some("abc123".to_string());
        let updated = repo.update(dataset.clone()).await.unwrap();
        assert_eq!(updated.sample_count, Some(1000));

        repo.delete(&dataset.id).await.unwrap();
        assert!(repo.get(&dataset.id).await.unwrap().is_none());
    }
}
