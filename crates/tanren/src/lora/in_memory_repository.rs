use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{Lora, LoraError, LoraId, LoraRepository, Result};

/// In-memory implementation of LoraRepository
#[derive(Clone)]
pub struct InMemoryLoraRepository {
    loras: Arc<RwLock<HashMap<LoraId, Lora>>>,
}

impl InMemoryLoraRepository {
    /// Create a new in-memory LoRA repository
    pub fn new() -> Self {
        Self {
            loras: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryLoraRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoraRepository for InMemoryLoraRepository {
    async fn create(&self, lora: Lora) -> Result<Lora> {
        let mut loras = self.loras.write().await;

        // Check if name already exists
        for existing_lora in loras.values() {
            if existing_lora.name == lora.name {
                return Err(LoraError::AlreadyExists(lora.name));
            }
        }

        let id = lora.id.clone();
        loras.insert(id, lora.clone());
        Ok(lora)
    }

    async fn get(&self, id: &LoraId) -> Result<Option<Lora>> {
        let loras = self.loras.read().await;
        Ok(loras.get(id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Lora>> {
        let loras = self.loras.read().await;
        Ok(loras.values().find(|l| l.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<Lora>> {
        let loras = self.loras.read().await;
        Ok(loras.values().cloned().collect())
    }

    async fn update(&self, lora: Lora) -> Result<Lora> {
        let mut loras = self.loras.write().await;

        if !loras.contains_key(&lora.id) {
            return Err(LoraError::NotFound(lora.id.to_string()));
        }

        // Check if name conflicts with other loras
        for (existing_id, existing_lora) in loras.iter() {
            if existing_lora.name == lora.name && existing_id != &lora.id {
                return Err(LoraError::AlreadyExists(lora.name));
            }
        }

        loras.insert(lora.id.clone(), lora.clone());
        Ok(lora)
    }

    async fn delete(&self, id: &LoraId) -> Result<()> {
        let mut loras = self.loras.write().await;

        if loras.remove(id).is_none() {
            return Err(LoraError::NotFound(id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{LoraMetadata, LoraStatus, TrainingInfo};

    fn create_test_metadata() -> LoraMetadata {
        LoraMetadata {
            rank: Some(64),
            alpha: Some(16.0),
            quantized_base: Some(true),
            training_info: Some(TrainingInfo {
                dataset: "databricks-dolly-15k".to_string(),
                dataset_hash: None,
                epochs: 1,
                batch_size: 4,
                learning_rate: 2e-4,
                final_loss: Some(1.2),
                duration_secs: Some(600),
            }),
            base_model: Some("meta-llama-3-8b-instruct".to_string()),
            version: Some("1.0.0".to_string()),
        }
    }

    fn create_test_lora(name: &str) -> Lora {
        Lora::new(
            name.to_string(),
            Some("Test adapter".to_string()),
            None,
            create_test_metadata(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryLoraRepository::new();
        let lora = create_test_lora("dolly-adapter");
        let id = lora.id.clone();

        let created = repo.create(lora).await.unwrap();
        assert_eq!(created.name, "dolly-adapter");
        assert_eq!(created.status, LoraStatus::Available);

        let retrieved = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(retrieved.metadata.rank, Some(64));
        assert_eq!(retrieved.metadata.quantized_base, Some(true));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let repo = InMemoryLoraRepository::new();
        repo.create(create_test_lora("dup")).await.unwrap();

        let result = repo.create(create_test_lora("dup")).await;
        assert!(matches!(result, Err(LoraError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_get_by_name() {
        let repo = InMemoryLoraRepository::new();
        let lora = create_test_lora("named");
        repo.create(lora.clone()).await.unwrap();

        let found = repo.get_by_name("named").await.unwrap().unwrap();
        assert_eq!(found.id, lora.id);

        assert!(repo.get_by_name("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status() {
        let repo = InMemoryLoraRepository::new();
        let mut lora = create_test_lora("status");
        repo.create(lora.clone()).await.unwrap();

        lora.status = LoraStatus::Error;
        let updated = repo.update(lora).await.unwrap();
        assert_eq!(updated.status, LoraStatus::Error);
    }

    #[tokio::test]
    async fn test_update_name_conflict() {
        let repo = InMemoryLoraRepository::new();
        repo.create(create_test_lora("first")).await.unwrap();
        let mut second = create_test_lora("second");
        repo.create(second.clone()).await.unwrap();

        second.name = "first".to_string();
        let result = repo.update(second).await;
        assert!(matches!(result, Err(LoraError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = InMemoryLoraRepository::new();
        let lora = create_test_lora("gone");
        repo.create(lora.clone()).await.unwrap();

        repo.delete(&lora.id).await.unwrap();
        assert!(repo.get(&lora.id).await.unwrap().is_none());

        let result = repo.delete(&lora.id).await;
        assert!(matches!(result, Err(LoraError::NotFound(_))));
    }
}
