//! CLI command handlers

use std::path::PathBuf;
use std::sync::Arc;

use tanren::base_model::{BaseModelService, HuggingFaceDownloader, InMemoryBaseModelRepository};
use tanren::config::TanrenConfig;
use tanren::dataset::{DatasetService, HuggingFaceDatasetFetcher, InMemoryDatasetRepository};
use tanren::lora::{InMemoryLoraRepository, LoraService};
use tanren::storage::LocalStorage;

pub mod dataset;
pub mod init;
pub mod lora;
pub mod setup;
pub mod train;
pub mod upload;

pub use dataset::{dataset_fetch, dataset_list, dataset_remove, dataset_show};
pub use init::run_init;
pub use lora::{lora_list, lora_remove, lora_show};
pub use setup::run_setup;
pub use train::{TrainOptions, run_train};
pub use upload::run_upload;

/// Configuration file name looked up in the working directory
const CONFIG_FILE: &str = "tanren.json";

/// Load the configuration, falling back to defaults
///
/// Looks for tanren.json in the working directory first, then
/// ~/.tanren/config.json, and uses the built-in defaults when neither
/// exists.
pub(crate) fn load_config() -> TanrenConfig {
    for path in config_candidates() {
        if !path.exists() {
            continue;
        }
        match TanrenConfig::load_from_file(&path) {
            Ok(config) => return config,
            Err(e) => {
                eprintln!("⚠️  Ignoring invalid config {}: {}", path.display(), e);
            }
        }
    }
    TanrenConfig::default()
}

fn config_candidates() -> Vec<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".tanren").join("config.json"));
    }
    candidates
}

pub(crate) fn model_service(config: &TanrenConfig) -> BaseModelService {
    BaseModelService::with_config(
        Arc::new(InMemoryBaseModelRepository::new()),
        Arc::new(LocalStorage::from_config(config)),
        Arc::new(HuggingFaceDownloader::new(hf_token())),
        config.clone(),
    )
}

pub(crate) fn dataset_service(config: &TanrenConfig) -> DatasetService {
    DatasetService::with_config(
        Arc::new(InMemoryDatasetRepository::new()),
        Arc::new(LocalStorage::from_config(config)),
        Arc::new(HuggingFaceDatasetFetcher::new(hf_token())),
        config.clone(),
    )
}

pub(crate) fn lora_service(config: &TanrenConfig) -> LoraService {
    LoraService::with_config(
        Arc::new(InMemoryLoraRepository::new()),
        Arc::new(LocalStorage::from_config(config)),
        config.clone(),
    )
}

fn hf_token() -> Option<String> {
    std::env::var("HF_TOKEN").ok()
}

/// Render a byte count the way `ls -h` would
pub(crate) fn format_size(bytes: u64) -> String {
    const MB: f64 = 1_048_576.0;
    if bytes as f64 >= MB {
        format!("{:.2} MB", bytes as f64 / MB)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_candidates_prefer_working_dir() {
        let candidates = config_candidates();
        assert_eq!(candidates[0], PathBuf::from("tanren.json"));
        assert!(candidates.len() <= 2);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1_048_576), "3.00 MB");
    }
}
