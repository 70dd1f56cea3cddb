use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder};

use super::{DatasetError, Result};
use crate::storage::Storage;

/// Dataset fetcher trait
#[async_trait]
pub trait DatasetFetcher: Send + Sync {
    /// Download dataset files matching the patterns into `dest_dir`
    ///
    /// Patterns are either exact filenames or `*.ext` suffix globs.
    async fn fetch(
        &self,
        repo_id: &str,
        patterns: &[&str],
        dest_dir: &str,
        storage: &dyn Storage,
        force: bool,
    ) -> Result<Vec<String>>;
}

/// HuggingFace dataset fetcher
pub struct HuggingFaceDatasetFetcher {
    api_token: Option<String>,
}

impl HuggingFaceDatasetFetcher {
    /// Create a new HuggingFace dataset fetcher
    pub fn new(api_token: Option<String>) -> Self {
        Self { api_token }
    }

    /// Create HuggingFace API client
    fn create_api(&self) -> Result<Api> {
        let mut builder = ApiBuilder::new();

        if let Some(token) = &self.api_token {
            builder = builder.with_token(Some(token.clone()));
        }

        builder
            .build()
            .map_err(|e| DatasetError::DownloadError(format!("Failed to create HF API: {}", e)))
    }
}

#[async_trait]
impl DatasetFetcher for HuggingFaceDatasetFetcher {
    async fn fetch(
        &self,
        repo_id: &str,
        patterns: &[&str],
        dest_dir: &str,
        storage: &dyn Storage,
        force: bool,
    ) -> Result<Vec<String>> {
        let api = self.create_api()?;
        let repo = api.dataset(repo_id.to_string());

        // Get repository info
        let info = repo
            .info()
            .await
            .map_err(|e| DatasetError::DownloadError(format!("Failed to get repo info: {}", e)))?;

        let mut downloaded_files = Vec::new();

        for sibling in &info.siblings {
            let filename = &sibling.rfilename;

            let should_download = patterns.iter().any(|pattern| {
                if pattern.starts_with("*.") {
                    filename.ends_with(&pattern[1..])
                } else {
                    filename == *pattern
                }
            });

            if !should_download {
                continue;
            }

            let file_path = format!("{}/{}", dest_dir, filename);

            // Check if file already exists
            if !force
                && storage
                    .exists(&file_path)
                    .await
                    .map_err(|e| DatasetError::DownloadError(format!("Storage error: {}", e)))?
            {
                downloaded_files.push(file_path);
                continue;
            }

            // Download file to the hub cache
            let downloaded_path = repo.download(filename).await.map_err(|e| {
                DatasetError::DownloadError(format!("Failed to download {}: {}", filename, e))
            })?;

            // Read the downloaded file
            let content = tokio::fs::read(&downloaded_path).await.map_err(|e| {
                DatasetError::DownloadError(format!("Failed to read downloaded file: {}", e))
            })?;

            // Write to storage
            storage
                .write(&file_path, &content)
                .await
                .map_err(|e| DatasetError::DownloadError(format!("Storage error: {}", e)))?;

            downloaded_files.push(file_path);
        }

        if downloaded_files.is_empty() {
            return Err(DatasetError::DownloadError(
                "No files found matching the patterns".to_string(),
            ));
        }

        Ok(downloaded_files)
    }
}
