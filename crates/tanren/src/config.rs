use serde::{Deserialize, Serialize};

use crate::storage::StorageConfig;

/// Tanren configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TanrenConfig {
    /// Base directory for all storage
    pub base_dir: String,

    /// Base models directory
    pub models_dir: String,

    /// Trained adapters directory
    pub loras_dir: String,

    /// Datasets directory
    pub datasets_dir: String,

    /// Training output directory (checkpoints and the final adapter)
    pub output_dir: String,

    /// Log level
    pub log_level: String,

    /// GCS upload configuration
    pub gcs: GcsConfig,
}

impl Default for TanrenConfig {
    fn default() -> Self {
        Self {
            base_dir: ".".to_string(),
            models_dir: "models".to_string(),
            loras_dir: "loras".to_string(),
            datasets_dir: "datasets".to_string(),
            output_dir: "./results".to_string(),
            log_level: "info".to_string(),
            gcs: GcsConfig::default(),
        }
    }
}

impl TanrenConfig {
    /// Load from configuration file
    pub fn load_from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))
    }

    /// Upload target described by this config, None when no bucket is set
    pub fn upload_target(&self) -> Option<StorageConfig> {
        self.gcs.bucket.as_ref().map(|bucket| StorageConfig::Gcs {
            bucket: bucket.clone(),
            prefix: self.gcs.prefix.clone(),
        })
    }
}

/// GCS upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    /// Target bucket name; uploads are skipped when unset
    pub bucket: Option<String>,

    /// Object key prefix inside the bucket
    pub prefix: String,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: "final_model".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TanrenConfig::default();
        assert_eq!(config.output_dir, "./results");
        assert_eq!(config.gcs.prefix, "final_model");
        assert!(config.gcs.bucket.is_none());
        assert!(config.upload_target().is_none());
    }

    #[test]
    fn test_upload_target_from_bucket() {
        let mut config = TanrenConfig::default();
        config.gcs.bucket = Some("oreo-llama".to_string());

        match config.upload_target() {
            Some(StorageConfig::Gcs { bucket, prefix }) => {
                assert_eq!(bucket, "oreo-llama");
                assert_eq!(prefix, "final_model");
            }
            other => panic!("unexpected upload target: {:?}", other),
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TanrenConfig =
            serde_json::from_str(r#"{"gcs": {"bucket": "my-bucket"}}"#).unwrap();
        assert_eq!(config.gcs.bucket.as_deref(), Some("my-bucket"));
        assert_eq!(config.gcs.prefix, "final_model");
        assert_eq!(config.models_dir, "models");
    }
}
