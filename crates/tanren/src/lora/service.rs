use super::{Lora, LoraError, LoraId, LoraMetadata, LoraRepository, LoraStatus, Result};
use crate::base_model::BaseModelId;
use crate::config::TanrenConfig;
use crate::storage::Storage;
use std::path::Path;
use std::sync::Arc;

/// Adapter files copied into the registry on registration
const ADAPTER_FILES: [&str; 2] = ["adapter_model.safetensors", "adapter_config.json"];

/// Service for managing LoRA adapters
#[derive(Clone)]
pub struct LoraService {
    repository: Arc<dyn LoraRepository>,
    storage: Arc<dyn Storage>,
    config: TanrenConfig,
}

impl LoraService {
    /// Create a new LoraService
    pub fn new(repository: Arc<dyn LoraRepository>, storage: Arc<dyn Storage>) -> Self {
        Self {
            repository,
            storage,
            config: TanrenConfig::default(),
        }
    }

    /// Create a new LoraService with config
    pub fn with_config(
        repository: Arc<dyn LoraRepository>,
        storage: Arc<dyn Storage>,
        config: TanrenConfig,
    ) -> Self {
        Self {
            repository,
            storage,
            config,
        }
    }

    /// Create a new LoRA entry
    pub async fn create(
        &self,
        name: String,
        description: Option<String>,
        base_model_id: Option<BaseModelId>,
        metadata: LoraMetadata,
    ) -> Result<Lora> {
        let lora = Lora::new(name, description, base_model_id, metadata);
        self.repository.create(lora).await
    }

    /// Register a pending adapter before training starts
    pub async fn register_pending(
        &self,
        name: String,
        base_model: Option<String>,
        rank: usize,
        alpha: f32,
        quantized_base: bool,
    ) -> Result<Lora> {
        let metadata = LoraMetadata {
            rank: Some(rank),
            alpha: Some(alpha),
            quantized_base: Some(quantized_base),
            training_info: None,
            base_model,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        };

        let lora = Lora::with_status(name, None, None, metadata, LoraStatus::Training);
        self.repository.create(lora).await
    }

    /// Finalize a trained adapter
    ///
    /// Copies the adapter files out of `adapter_dir` into
    /// `<loras_dir>/<name>/`, fills in the training info and flips the
    /// status to available.
    pub async fn finalize_trained(
        &self,
        name: &str,
        adapter_dir: &Path,
        info: super::TrainingInfo,
    ) -> Result<Lora> {
        let mut lora = self
            .repository
            .get_by_name(name)
            .await?
            .ok_or_else(|| LoraError::NotFound(name.to_string()))?;

        let lora_dir = format!("{}/{}", self.config.loras_dir, name);
        self.storage.create_dir(&lora_dir).await?;

        let mut weights_path = None;
        for file in ADAPTER_FILES {
            let source = adapter_dir.join(file);
            let dest = format!("{}/{}", lora_dir, file);
            self.storage
                .copy(&source.to_string_lossy(), &dest)
                .await?;
            if file.ends_with(".safetensors") {
                weights_path = Some(dest);
            }
        }

        let weights_path =
            weights_path.ok_or_else(|| LoraError::InvalidMetadata("No adapter weights".into()))?;
        let size_bytes = self.storage.metadata(&weights_path).await?.size;

        lora.status = LoraStatus::Available;
        lora.file_path = Some(weights_path);
        lora.size_bytes = Some(size_bytes);
        lora.metadata.training_info = Some(info);

        let updated = self.repository.update(lora).await?;
        self.write_meta(&updated).await?;
        Ok(updated)
    }

    /// Update the status of a named adapter
    pub async fn mark_status(&self, name: &str, status: LoraStatus) -> Result<Lora> {
        let mut lora = self
            .repository
            .get_by_name(name)
            .await?
            .ok_or_else(|| LoraError::NotFound(name.to_string()))?;

        lora.status = status;
        let updated = self.repository.update(lora).await?;

        // Keep meta.toml in sync when the adapter dir already exists
        let lora_dir = format!("{}/{}", self.config.loras_dir, name);
        if self.storage.exists(&lora_dir).await? {
            self.write_meta(&updated).await?;
        }

        Ok(updated)
    }

    /// Get a LoRA by ID
    pub async fn get(&self, id: &LoraId) -> Result<Option<Lora>> {
        self.repository.get(id).await
    }

    /// Get a LoRA by name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Lora>> {
        self.repository.get_by_name(name).await
    }

    /// List all LoRAs
    pub async fn list(&self) -> Result<Vec<Lora>> {
        self.repository.list().await
    }

    /// Update a LoRA
    pub async fn update(&self, lora: Lora) -> Result<Lora> {
        self.repository.update(lora).await
    }

    /// Delete a LoRA and its files
    pub async fn delete(&self, name: &str, keep_files: bool) -> Result<()> {
        let lora = self
            .repository
            .get_by_name(name)
            .await?
            .ok_or_else(|| LoraError::NotFound(name.to_string()))?;

        self.repository.delete(&lora.id).await?;

        if !keep_files {
            let lora_dir = format!("{}/{}", self.config.loras_dir, name);
            if self.storage.exists(&lora_dir).await? {
                self.storage.delete(&lora_dir).await?;
            }
        }

        Ok(())
    }

    async fn write_meta(&self, lora: &Lora) -> Result<()> {
        let meta_path = format!("{}/{}/meta.toml", self.config.loras_dir, lora.name);
        let meta_toml = toml::to_string_pretty(lora).map_err(|e| {
            LoraError::SerializationError(format!("Failed to serialize LoRA: {}", e))
        })?;
        self.storage.write(&meta_path, meta_toml.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::{InMemoryLoraRepository, TrainingInfo};
    use crate::storage::LocalStorage;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tanren-lora-{}", uuid::Uuid::new_v4()))
    }

    fn service(base: &PathBuf) -> LoraService {
        LoraService::new(
            Arc::new(InMemoryLoraRepository::new()),
            Arc::new(LocalStorage::new(base)),
        )
    }

    fn training_info() -> TrainingInfo {
        TrainingInfo {
            dataset: "databricks-dolly-15k".to_string(),
            dataset_hash: Some("deadbeef".to_string()),
            epochs: 1,
            batch_size: 4,
            learning_rate: 2e-4,
            final_loss: Some(1.1),
            duration_secs: Some(60),
        }
    }

    #[tokio::test]
    async fn test_register_then_finalize() {
        let base = scratch_dir();
        let service = service(&base);

        let pending = service
            .register_pending(
                "dolly-adapter".to_string(),
                Some("meta-llama-3-8b-instruct".to_string()),
                64,
                16.0,
                true,
            )
            .await
            .unwrap();
        assert_eq!(pending.status, LoraStatus::Training);

        // Fake trained adapter output
        let adapter_dir = base.join("results/final_model");
        std::fs::create_dir_all(&adapter_dir).unwrap();
        std::fs::write(adapter_dir.join("adapter_model.safetensors"), b"weights").unwrap();
        std::fs::write(adapter_dir.join("adapter_config.json"), b"{}").unwrap();

        let finalized = service
            .finalize_trained("dolly-adapter", &adapter_dir, training_info())
            .await
            .unwrap();

        assert_eq!(finalized.status, LoraStatus::Available);
        assert_eq!(finalized.size_bytes, Some(7));
        assert_eq!(
            finalized.file_path.as_deref(),
            Some("loras/dolly-adapter/adapter_model.safetensors")
        );
        assert!(base.join("loras/dolly-adapter/meta.toml").exists());

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_mark_status_error() {
        let base = scratch_dir();
        let service = service(&base);

        service
            .register_pending("failed-run".to_string(), None, 64, 16.0, false)
            .await
            .unwrap();

        let marked = service
            .mark_status("failed-run", LoraStatus::Error)
            .await
            .unwrap();
        assert_eq!(marked.status, LoraStatus::Error);

        std::fs::remove_dir_all(&base).ok();
    }

    #[tokio::test]
    async fn test_delete_removes_files() {
        let base = scratch_dir();
        let service = service(&base);

        service
            .register_pending("gone".to_string(), None, 64, 16.0, false)
            .await
            .unwrap();

        let adapter_dir = base.join("out");
        std::fs::create_dir_all(&adapter_dir).unwrap();
        std::fs::write(adapter_dir.join("adapter_model.safetensors"), b"w").unwrap();
        std::fs::write(adapter_dir.join("adapter_config.json"), b"{}").unwrap();

        service
            .finalize_trained("gone", &adapter_dir, training_info())
            .await
            .unwrap();
        assert!(base.join("loras/gone/adapter_model.safetensors").exists());

        service.delete("gone", false).await.unwrap();
        assert!(!base.join("loras/gone").exists());
        assert!(service.get_by_name("gone").await.unwrap().is_none());

        std::fs::remove_dir_all(&base).unwrap();
    }
}
