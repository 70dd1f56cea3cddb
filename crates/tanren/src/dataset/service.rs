use std::sync::Arc;

use tanren_core::InstructionSample;

use super::{Dataset, DatasetError, DatasetFetcher, DatasetRepository, Result};
use crate::config::TanrenConfig;
use crate::storage::Storage;

/// Raw file patterns fetched from dataset repositories
const DATASET_FILE_PATTERNS: [&str; 1] = ["*.jsonl"];

/// Service for managing instruction datasets
#[derive(Clone)]
pub struct DatasetService {
    repository: Arc<dyn DatasetRepository>,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn DatasetFetcher>,
    config: TanrenConfig,
}

impl DatasetService {
    /// Create a new DatasetService
    pub fn new(
        repository: Arc<dyn DatasetRepository>,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn DatasetFetcher>,
    ) -> Self {
        Self {
            repository,
            storage,
            fetcher,
            config: TanrenConfig::default(),
        }
    }

    /// Create a new DatasetService with config
    pub fn with_config(
        repository: Arc<dyn DatasetRepository>,
        storage: Arc<dyn Storage>,
        fetcher: Arc<dyn DatasetFetcher>,
        config: TanrenConfig,
    ) -> Self {
        Self {
            repository,
            storage,
            fetcher,
            config,
        }
    }

    /// Fetch a dataset split from HuggingFace and register it
    pub async fn fetch(
        &self,
        name: Option<String>,
        repo_id: &str,
        split: &str,
        force: bool,
    ) -> Result<Dataset> {
        let name = name.unwrap_or_else(|| default_dataset_name(repo_id));

        // Reuse an existing download unless forced
        if !force {
            if let Some(existing) = self.repository.get_by_name(&name).await? {
                if existing.file_path.is_some() {
                    return Ok(existing);
                }
            }
        }

        let data_dir = format!("{}/{}", self.config.datasets_dir, name);

        let files = self
            .fetcher
            .fetch(
                repo_id,
                &DATASET_FILE_PATTERNS,
                &data_dir,
                self.storage.as_ref(),
                force,
            )
            .await?;

        // The jsonl file with the samples
        let main_file = files
            .iter()
            .find(|f| f.ends_with(".jsonl"))
            .or_else(|| files.first())
            .cloned()
            .ok_or_else(|| DatasetError::DownloadError("No dataset file found".to_string()))?;

        let content = self.storage.read(&main_file).await?;
        let hash = sha256::digest(content.as_slice());
        let text = String::from_utf8(content)
            .map_err(|e| DatasetError::InvalidFormat(format!("Dataset is not UTF-8: {}", e)))?;
        let sample_count = text.lines().filter(|line| !line.trim().is_empty()).count();
        let size_bytes = text.len() as u64;

        let mut dataset = match self.repository.get_by_name(&name).await? {
            Some(existing) => existing,
            None => {
                let dataset = Dataset::new(
                    name.clone(),
                    Some(format!("Fetched from HuggingFace: {}", repo_id)),
                    Some(repo_id.to_string()),
                    split.to_string(),
                );
                self.repository.create(dataset).await?
            }
        };

        dataset.repo_id = Some(repo_id.to_string());
        dataset.split = split.to_string();
        dataset.file_path = Some(main_file);
        dataset.sample_count = Some(sample_count);
        dataset.size_bytes = Some(size_bytes);
        dataset.hash = Some(hash);
        dataset.updated_at = chrono::Utc::now().to_rfc3339();

        // Save metadata next to the data file
        let meta_path = format!("{}/meta.toml", data_dir);
        let meta_toml = toml::to_string_pretty(&dataset).map_err(|e| {
            DatasetError::SerializationError(format!("Failed to serialize dataset: {}", e))
        })?;
        self.storage.write(&meta_path, meta_toml.as_bytes()).await?;

        self.repository.update(dataset).await
    }

    /// Load parsed samples, truncated to `limit` when given
    pub async fn load_samples(
        &self,
        name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<InstructionSample>> {
        let dataset = self
            .repository
            .get_by_name(name)
            .await?
            .ok_or_else(|| DatasetError::NotFound(name.to_string()))?;

        let file_path = dataset
            .file_path
            .ok_or_else(|| DatasetError::NotFound(format!("Dataset '{}' has no data file", name)))?;

        let content = self.storage.read(&file_path).await?;
        let text = String::from_utf8(content)
            .map_err(|e| DatasetError::InvalidFormat(format!("Dataset is not UTF-8: {}", e)))?;

        let mut samples = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(limit) = limit {
                if samples.len() >= limit {
                    break;
                }
            }
            let sample: InstructionSample = serde_json::from_str(line).map_err(|e| {
                DatasetError::InvalidFormat(format!("line {}: {}", index + 1, e))
            })?;
            samples.push(sample);
        }

        Ok(samples)
    }

    /// Render samples into training texts, truncated to `limit` when given
    pub async fn prepare(&self, name: &str, limit: Option<usize>) -> Result<Vec<String>> {
        let samples = self.load_samples(name, limit).await?;
        Ok(samples
            .iter()
            .map(InstructionSample::to_training_text)
            .collect())
    }

    /// Get a dataset by name
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Dataset>> {
        self.repository.get_by_name(name).await
    }

    /// List all datasets
    pub async fn list(&self) -> Result<Vec<Dataset>> {
        self.repository.list().await
    }

    /// Delete a dataset and its files
    pub async fn delete(&self, name: &str) -> Result<()> {
        let dataset = self
            .repository
            .get_by_name(name)
            .await?
            .ok_or_else(|| DatasetError::NotFound(name.to_string()))?;

        self.repository.delete(&dataset.id).await?;

        let data_dir = format!("{}/{}", self.config.datasets_dir, dataset.name);
        if self.storage.exists(&data_dir).await? {
            self.storage.delete(&data_dir).await?;
        }

        Ok(())
    }
}

/// Derive a registry name from a dataset repo id, e.g.
/// "databricks/databricks-dolly-15k" -> "databricks-dolly-15k"
fn default_dataset_name(repo_id: &str) -> String {
    repo_id
        .rsplit('/')
        .next()
        .unwrap_or(repo_id)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDatasetRepository;
    use crate::storage::LocalStorage;
    use async_trait::async_trait;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tanren-dataset-{}", uuid::Uuid::new_v4()))
    }

    /// Fetcher that writes a fixed jsonl file instead of hitting the hub
    struct FixtureFetcher {
        rows: String,
    }

    #[async_trait]
    impl DatasetFetcher for FixtureFetcher {
        async fn fetch(
            &self,
            _repo_id: &str,
            _patterns: &[&str],
            dest_dir: &str,
            storage: &dyn Storage,
            _force: bool,
        ) -> Result<Vec<String>> {
            let file_path = format!("{}/data.jsonl", dest_dir);
            storage.write(&file_path, self.rows.as_bytes()).await?;
            Ok(vec![file_path])
        }
    }

    fn fixture_rows() -> String {
        [
            r#"{"instruction":"Name three primary colors.","context":"","response":"Red, blue and yellow.","category":"brainstorming"}"#,
            r#"{"instruction":"What is the capital of France?","context":"","response":"Paris.","category":"open_qa"}"#,
            r#"{"instruction":"Say hello.","context":"","response":"Hello!","category":"open_qa"}"#,
        ]
        .join("\n")
    }

    fn service_with_fixture(base: &PathBuf) -> DatasetService {
        let repository = Arc::new(InMemoryDatasetRepository::new());
        let storage = Arc::new(LocalStorage::new(base));
        let fetcher = Arc::new(FixtureFetcher {
            rows: fixture_rows(),
        });
        DatasetService::new(repository, storage, fetcher)
    }

    #[tokio::test]
    async fn test_fetch_registers_dataset() {
        let base = scratch_dir();
        let service = service_with_fixture(&base);

        let dataset = service
            .fetch(None, "databricks/databricks-dolly-15k", "train", false)
            .await
            .unwrap();

        assert_eq!(dataset.name, "databricks-dolly-15k");
        assert_eq!(dataset.split, "train");
        assert_eq!(dataset.sample_count, Some(3));
        assert!(dataset.hash.is_some());
        assert!(
            dataset
                .file_path
                .as_deref()
                .unwrap()
                .ends_with("data.jsonl")
        );

        // meta.toml written next to the data
        let meta = service
            .storage
            .read("datasets/databricks-dolly-15k/meta.toml")
            .await
            .unwrap();
        assert!(String::from_utf8(meta).unwrap().contains("dolly"));

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_load_samples_with_limit() {
        let base = scratch_dir();
        let service = service_with_fixture(&base);

        service
            .fetch(
                Some("dolly".to_string()),
                "databricks/databricks-dolly-15k",
                "train",
                false,
            )
            .await
            .unwrap();

        let samples = service.load_samples("dolly", Some(2)).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].instruction, "Name three primary colors.");

        let all = service.load_samples("dolly", None).await.unwrap();
        assert_eq!(all.len(), 3);

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_prepare_renders_template() {
        let base = scratch_dir();
        let service = service_with_fixture(&base);

        service
            .fetch(
                Some("dolly".to_string()),
                "databricks/databricks-dolly-15k",
                "train",
                false,
            )
            .await
            .unwrap();

        let texts = service.prepare("dolly", Some(1)).await.unwrap();
        assert_eq!(
            texts[0],
            "### Instruction:\nName three primary colors.\n\n### Response:\nRed, blue and yellow."
        );

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[tokio::test]
    async fn test_load_samples_missing_dataset() {
        let base = scratch_dir();
        let service = service_with_fixture(&base);

        let result = service.load_samples("missing", None).await;
        assert!(matches!(result, Err(DatasetError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_files() {
        let base = scratch_dir();
        let service = service_with_fixture(&base);

        service
            .fetch(
                Some("dolly".to_string()),
                "databricks/databricks-dolly-15k",
                "train",
                false,
            )
            .await
            .unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);

        service.delete("dolly").await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
        assert!(!service.storage.exists("datasets/dolly").await.unwrap());

        std::fs::remove_dir_all(&base).unwrap();
    }
}
