use async_trait::async_trait;
use hf_hub::api::tokio::{Api, ApiBuilder};

use super::{BaseModelError, BaseModelResult};
use crate::storage::Storage;

/// Model downloader trait
#[async_trait]
pub trait ModelDownloader: Send + Sync {
    /// Download a single file from a model repository into `dest_dir`
    async fn download_file(
        &self,
        repo_id: &str,
        filename: &str,
        dest_dir: &str,
        storage: &dyn Storage,
        force: bool,
    ) -> BaseModelResult<String>;

    /// Download all repository files matching the patterns into `dest_dir`
    ///
    /// Patterns are either exact filenames or `*.ext` suffix globs.
    async fn download_matching(
        &self,
        repo_id: &str,
        patterns: &[&str],
        dest_dir: &str,
        storage: &dyn Storage,
        force: bool,
    ) -> BaseModelResult<Vec<String>>;
}

/// HuggingFace model downloader
pub struct HuggingFaceDownloader {
    api_token: Option<String>,
}

impl HuggingFaceDownloader {
    /// Create a new HuggingFace downloader
    pub fn new(api_token: Option<String>) -> Self {
        Self { api_token }
    }

    /// Create HuggingFace API client
    fn create_api(&self) -> BaseModelResult<Api> {
        let mut builder = ApiBuilder::new();

        if let Some(token) = &self.api_token {
            builder = builder.with_token(Some(token.clone()));
        }

        builder
            .build()
            .map_err(|e| BaseModelError::DownloadError(format!("Failed to create HF API: {}", e)))
    }
}

/// Check a repo filename against exact names and `*.ext` suffix globs
pub(crate) fn matches_any(filename: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.starts_with("*.") {
            filename.ends_with(&pattern[1..])
        } else {
            filename == *pattern
        }
    })
}

#[async_trait]
impl ModelDownloader for HuggingFaceDownloader {
    async fn download_file(
        &self,
        repo_id: &str,
        filename: &str,
        dest_dir: &str,
        storage: &dyn Storage,
        force: bool,
    ) -> BaseModelResult<String> {
        let file_path = format!("{}/{}", dest_dir, filename);

        // Check if file already exists
        if !force
            && storage
                .exists(&file_path)
                .await
                .map_err(|e| BaseModelError::DownloadError(format!("Storage error: {}", e)))?
        {
            return Ok(file_path);
        }

        // Create API client
        let api = self.create_api()?;
        let repo = api.model(repo_id.to_string());

        // Download file to the hub cache
        let downloaded_path = repo
            .download(filename)
            .await
            .map_err(|e| BaseModelError::DownloadError(format!("Download failed: {}", e)))?;

        // Read the downloaded file
        let content = tokio::fs::read(&downloaded_path).await.map_err(|e| {
            BaseModelError::DownloadError(format!("Failed to read downloaded file: {}", e))
        })?;

        // Write to storage
        storage.write(&file_path, &content).await.map_err(|e| {
            BaseModelError::DownloadError(format!("Failed to write to storage: {}", e))
        })?;

        Ok(file_path)
    }

    async fn download_matching(
        &self,
        repo_id: &str,
        patterns: &[&str],
        dest_dir: &str,
        storage: &dyn Storage,
        force: bool,
    ) -> BaseModelResult<Vec<String>> {
        let api = self.create_api()?;
        let repo = api.model(repo_id.to_string());

        // Get repository info
        let info = repo.info().await.map_err(|e| {
            BaseModelError::DownloadError(format!("Failed to get repo info: {}", e))
        })?;

        let mut downloaded_files = Vec::new();

        for sibling in &info.siblings {
            let filename = &sibling.rfilename;

            if !matches_any(filename, patterns) {
                continue;
            }

            let file_path = format!("{}/{}", dest_dir, filename);

            // Check if file already exists
            if !force
                && storage
                    .exists(&file_path)
                    .await
                    .map_err(|e| BaseModelError::DownloadError(format!("Storage error: {}", e)))?
            {
                downloaded_files.push(file_path);
                continue;
            }

            // Download file
            let downloaded_path = repo.download(filename).await.map_err(|e| {
                BaseModelError::DownloadError(format!("Failed to download {}: {}", filename, e))
            })?;

            // Read the downloaded file
            let content = tokio::fs::read(&downloaded_path).await.map_err(|e| {
                BaseModelError::DownloadError(format!("Failed to read downloaded file: {}", e))
            })?;

            // Write to storage
            storage.write(&file_path, &content).await.map_err(|e| {
                BaseModelError::DownloadError(format!("Failed to write to storage: {}", e))
            })?;

            downloaded_files.push(file_path);
        }

        if downloaded_files.is_empty() {
            return Err(BaseModelError::DownloadError(
                "No files found matching the patterns".to_string(),
            ));
        }

        Ok(downloaded_files)
    }
}
