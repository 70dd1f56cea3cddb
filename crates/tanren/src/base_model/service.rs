use std::path::PathBuf;
use std::sync::Arc;

use super::{
    BaseModel, BaseModelError, BaseModelId, BaseModelMetadata, BaseModelRepository,
    BaseModelResult, ModelDownloader,
};
use crate::config::TanrenConfig;
use crate::storage::Storage;

/// Files needed to load and finetune a model locally
const MODEL_FILE_PATTERNS: [&str; 4] = [
    "*.safetensors",
    "tokenizer.json",
    "tokenizer_config.json",
    "config.json",
];

/// Service layer for BaseModel operations
#[derive(Clone)]
pub struct BaseModelService {
    repository: Arc<dyn BaseModelRepository>,
    storage: Arc<dyn Storage>,
    downloader: Arc<dyn ModelDownloader>,
    config: TanrenConfig,
}

impl BaseModelService {
    /// Create a new BaseModelService
    pub fn new(
        repository: Arc<dyn BaseModelRepository>,
        storage: Arc<dyn Storage>,
        downloader: Arc<dyn ModelDownloader>,
    ) -> Self {
        Self {
            repository,
            storage,
            downloader,
            config: TanrenConfig::default(),
        }
    }

    /// Create a new BaseModelService with config
    pub fn with_config(
        repository: Arc<dyn BaseModelRepository>,
        storage: Arc<dyn Storage>,
        downloader: Arc<dyn ModelDownloader>,
        config: TanrenConfig,
    ) -> Self {
        Self {
            repository,
            storage,
            downloader,
            config,
        }
    }

    /// List all registered base models
    pub async fn list_models(&self) -> BaseModelResult<Vec<BaseModel>> {
        self.repository.list().await
    }

    /// Get a specific model by ID
    pub async fn get_model(&self, id: &BaseModelId) -> BaseModelResult<BaseModel> {
        self.repository.get(id).await
    }

    /// Get a specific model by name
    pub async fn get_model_by_name(&self, name: &str) -> BaseModelResult<BaseModel> {
        self.repository.get_by_name(name).await
    }

    /// Register a new base model
    pub async fn register_model(
        &self,
        name: String,
        description: Option<String>,
        repo_id: Option<String>,
        local_dir: Option<String>,
        size_mb: Option<u64>,
        metadata: Option<BaseModelMetadata>,
    ) -> BaseModelResult<BaseModel> {
        // Validate input
        if name.is_empty() {
            return Err(BaseModelError::InvalidData(
                "Model name cannot be empty".to_string(),
            ));
        }

        // Check if model with same name already exists
        if self.repository.exists_by_name(&name).await? {
            return Err(BaseModelError::AlreadyExists(name));
        }

        let model = BaseModel {
            id: BaseModelId::new(),
            name,
            description,
            repo_id,
            local_dir,
            size_mb,
            metadata,
        };

        self.repository.create(model).await
    }

    /// Download a pretrained model and register it
    ///
    /// Fetches weights, tokenizer and config into
    /// `<models_dir>/<name>/`, probes config.json for architecture
    /// info and writes a meta.toml next to the files.
    pub async fn setup(
        &self,
        name: Option<String>,
        repo_id: &str,
        force: bool,
    ) -> BaseModelResult<BaseModel> {
        let name = name.unwrap_or_else(|| default_model_name(repo_id));

        // Reuse an existing download unless forced
        if !force {
            if let Ok(existing) = self.repository.get_by_name(&name).await {
                if self.is_model_downloaded(&existing.id).await? {
                    return Ok(existing);
                }
            }
        }

        let model_dir = format!("{}/{}", self.config.models_dir, name);

        let files = self
            .downloader
            .download_matching(
                repo_id,
                &MODEL_FILE_PATTERNS,
                &model_dir,
                self.storage.as_ref(),
                force,
            )
            .await?;

        let (architecture, parameters) = self.probe_config(&model_dir).await;

        let mut total_bytes: u64 = 0;
        for file in &files {
            if let Ok(meta) = self.storage.metadata(file).await {
                total_bytes += meta.size;
            }
        }

        let metadata = BaseModelMetadata {
            repo_id: repo_id.to_string(),
            name: name.clone(),
            description: Some(format!("Downloaded from HuggingFace: {}", repo_id)),
            downloaded_at: Some(chrono::Utc::now().to_rfc3339()),
            parameters,
            architecture,
            quantization: None,
        };

        // Write metadata next to the model files
        let meta_toml = toml::to_string_pretty(&metadata).map_err(|e| {
            BaseModelError::InvalidData(format!("Failed to serialize metadata: {}", e))
        })?;
        self.storage
            .write(&format!("{}/meta.toml", model_dir), meta_toml.as_bytes())
            .await
            .map_err(|e| BaseModelError::InvalidData(format!("Storage error: {}", e)))?;

        // Register or refresh the registry entry
        if let Ok(mut existing) = self.repository.get_by_name(&name).await {
            existing.repo_id = Some(repo_id.to_string());
            existing.local_dir = Some(model_dir);
            existing.size_mb = Some(total_bytes / (1024 * 1024));
            existing.metadata = Some(metadata);
            self.repository.update(existing).await
        } else {
            self.register_model(
                name.clone(),
                Some(format!("Downloaded from HuggingFace: {}", repo_id)),
                Some(repo_id.to_string()),
                Some(model_dir),
                Some(total_bytes / (1024 * 1024)),
                Some(metadata),
            )
            .await
        }
    }

    /// Resolve a model name to the local directory holding its files
    pub async fn resolve_dir(&self, model: &str) -> BaseModelResult<PathBuf> {
        // Registered models first
        if let Ok(entry) = self.repository.get_by_name(model).await {
            if let Some(dir) = &entry.local_dir {
                return Ok(PathBuf::from(&self.config.base_dir).join(dir));
            }
        }

        // Fall back to a directory that already has model files
        let model_dir = format!("{}/{}", self.config.models_dir, model);
        let config_path = format!("{}/config.json", model_dir);
        let exists = self
            .storage
            .exists(&config_path)
            .await
            .map_err(|e| BaseModelError::InvalidData(format!("Storage error: {}", e)))?;
        if exists {
            return Ok(PathBuf::from(&self.config.base_dir).join(model_dir));
        }

        Err(BaseModelError::NotFound(format!(
            "Model '{}' is not set up. Run setup with a HuggingFace repo id first",
            model
        )))
    }

    /// Check if a model is downloaded
    pub async fn is_model_downloaded(&self, id: &BaseModelId) -> BaseModelResult<bool> {
        let model = self.repository.get(id).await?;
        Ok(model
            .metadata
            .as_ref()
            .and_then(|m| m.downloaded_at.as_ref())
            .is_some())
    }

    /// List downloaded models
    pub async fn list_downloaded_models(&self) -> BaseModelResult<Vec<BaseModel>> {
        let all_models = self.repository.list().await?;

        let mut downloaded_models = Vec::new();
        for model in all_models {
            if self.is_model_downloaded(&model.id).await? {
                downloaded_models.push(model);
            }
        }

        Ok(downloaded_models)
    }

    /// Read architecture info out of a downloaded config.json
    async fn probe_config(&self, model_dir: &str) -> (Option<String>, Option<String>) {
        let config_path = format!("{}/config.json", model_dir);

        let content = match self.storage.read(&config_path).await {
            Ok(content) => content,
            Err(_) => return (None, None),
        };

        let config: serde_json::Value = match serde_json::from_slice(&content) {
            Ok(config) => config,
            Err(_) => return (None, None),
        };

        let architecture = config
            .get("architectures")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        let parameters = match (
            config.get("hidden_size").and_then(|v| v.as_u64()),
            config.get("num_hidden_layers").and_then(|v| v.as_u64()),
        ) {
            (Some(hidden_size), Some(num_layers)) => {
                Some(estimate_parameters(hidden_size, num_layers))
            }
            _ => None,
        };

        (architecture, parameters)
    }
}

/// Derive a registry name from a repo id, e.g.
/// "meta-llama/Meta-Llama-3-8B-Instruct" -> "meta-llama-3-8b-instruct"
fn default_model_name(repo_id: &str) -> String {
    repo_id
        .rsplit('/')
        .next()
        .unwrap_or(repo_id)
        .to_lowercase()
}

/// Rough decoder parameter count, attention + mlp is about 12 * h^2 per layer
fn estimate_parameters(hidden_size: u64, num_layers: u64) -> String {
    let approx = 12 * hidden_size * hidden_size * num_layers;
    if approx < 1_000_000_000 {
        format!("~{}M", approx / 1_000_000)
    } else {
        format!("~{:.1}B", approx as f64 / 1e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_model::{HuggingFaceDownloader, InMemoryBaseModelRepository};
    use crate::storage::LocalStorage;

    #[test]
    fn test_default_model_name() {
        assert_eq!(
            default_model_name("meta-llama/Meta-Llama-3-8B-Instruct"),
            "meta-llama-3-8b-instruct"
        );
        assert_eq!(default_model_name("tinyllama"), "tinyllama");
    }

    #[test]
    fn test_estimate_parameters() {
        // Llama 3 8B dimensions
        assert_eq!(estimate_parameters(4096, 32), "~6.4B");
        // Tiny test model
        assert_eq!(estimate_parameters(256, 4), "~3M");
    }

    #[tokio::test]
    async fn test_registry_roundtrip() {
        let base = std::env::temp_dir().join(format!("tanren-base-model-{}", uuid::Uuid::new_v4()));
        let service = BaseModelService::new(
            Arc::new(InMemoryBaseModelRepository::new()),
            Arc::new(LocalStorage::new(&base)),
            Arc::new(HuggingFaceDownloader::new(None)),
        );

        let model = service
            .register_model(
                "tiny".to_string(),
                None,
                Some("org/tiny".to_string()),
                Some("models/tiny".to_string()),
                Some(3),
                None,
            )
            .await
            .unwrap();

        assert_eq!(service.get_model(&model.id).await.unwrap().name, "tiny");
        assert_eq!(
            service.get_model_by_name("tiny").await.unwrap().id,
            model.id
        );
        assert_eq!(service.list_models().await.unwrap().len(), 1);

        // Not downloaded until the metadata records a timestamp
        assert!(!service.is_model_downloaded(&model.id).await.unwrap());
        assert!(service.list_downloaded_models().await.unwrap().is_empty());

        // Duplicate names are rejected
        let duplicate = service
            .register_model("tiny".to_string(), None, None, None, None, None)
            .await;
        assert!(matches!(duplicate, Err(BaseModelError::AlreadyExists(_))));
    }
}
