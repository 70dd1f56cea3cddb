use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{BaseModel, BaseModelError, BaseModelId, BaseModelRepository, BaseModelResult};

/// In-memory implementation of BaseModelRepository for testing and development
pub struct InMemoryBaseModelRepository {
    models: RwLock<HashMap<String, BaseModel>>,
}

impl InMemoryBaseModelRepository {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBaseModelRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseModelRepository for InMemoryBaseModelRepository {
    async fn list(&self) -> BaseModelResult<Vec<BaseModel>> {
        let models = self.models.read().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(models.values().cloned().collect())
    }

    async fn get(&self, id: &BaseModelId) -> BaseModelResult<BaseModel> {
        let models = self.models.read().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire read lock: {}", e))
        })?;
        models
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| BaseModelError::NotFound(id.to_string()))
    }

    async fn get_by_name(&self, name: &str) -> BaseModelResult<BaseModel> {
        let models = self.models.read().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire read lock: {}", e))
        })?;
        models
            .values()
            .find(|model| model.name == name)
            .cloned()
            .ok_or_else(|| {
                BaseModelError::NotFound(format!("Model with name '{}' not found", name))
            })
    }

    async fn create(&self, model: BaseModel) -> BaseModelResult<BaseModel> {
        let mut models = self.models.write().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire write lock: {}", e))
        })?;

        if models.contains_key(model.id.as_str()) {
            return Err(BaseModelError::AlreadyExists(model.id.to_string()));
        }

        models.insert(model.id.to_string(), model.clone());
        Ok(model)
    }

    async fn update(&self, model: BaseModel) -> BaseModelResult<BaseModel> {
        let mut models = self.models.write().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire write lock: {}", e))
        })?;

        if !models.contains_key(model.id.as_str()) {
            return Err(BaseModelError::NotFound(model.id.to_string()));
        }

        models.insert(model.id.to_string(), model.clone());
        Ok(model)
    }

    async fn delete(&self, id: &BaseModelId) -> BaseModelResult<()> {
        let mut models = self.models.write().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire write lock: {}", e))
        })?;

        models
            .remove(id.as_str())
            .ok_or_else(|| BaseModelError::NotFound(id.to_string()))?;
        Ok(())
    }

    async fn exists(&self, id: &BaseModelId) -> BaseModelResult<bool> {
        let models = self.models.read().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(models.contains_key(id.as_str()))
    }

    async fn exists_by_name(&self, name: &str) -> BaseModelResult<bool> {
        let models = self.models.read().map_err(|e| {
            BaseModelError::RepositoryError(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(models.values().any(|model| model.name == name))
    }
}
