//! GCS upload through the gsutil CLI
//!
//! Credentials are whatever gsutil resolves on its own
//! (GOOGLE_APPLICATION_CREDENTIALS or an active gcloud login); nothing
//! is read here.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use super::{StorageConfig, StorageError, StorageResult};

/// Uploader that mirrors a local directory into a GCS bucket
#[derive(Debug, Clone)]
pub struct GcsUploader {
    bucket: String,
    prefix: String,
}

impl GcsUploader {
    /// Create a new uploader for a bucket and object key prefix
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Build an uploader from a storage config, None unless it names a GCS target
    pub fn from_config(config: &StorageConfig) -> Option<Self> {
        match config {
            StorageConfig::Gcs { bucket, prefix } => Some(Self::new(bucket, prefix)),
            StorageConfig::Local { .. } => None,
        }
    }

    /// Target bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key prefix inside the bucket
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Upload every file under `local_dir`, mirroring its layout under the prefix
    ///
    /// Returns the object keys that were written.
    pub async fn upload_dir(&self, local_dir: &Path) -> StorageResult<Vec<String>> {
        let plan = plan_uploads(local_dir, &self.prefix)?;
        let mut uploaded = Vec::with_capacity(plan.len());

        for (local_file, key) in plan {
            self.upload_file(&local_file, &key).await?;
            println!(
                "Uploaded {} to gs://{}/{}",
                local_file.display(),
                self.bucket,
                key
            );
            uploaded.push(key);
        }

        Ok(uploaded)
    }

    /// Upload a single file with `gsutil cp`
    pub async fn upload_file(&self, local_file: &Path, key: &str) -> StorageResult<()> {
        let dest = format!("gs://{}/{}", self.bucket, key);

        let output = Command::new("gsutil")
            .args(["cp", &local_file.to_string_lossy(), &dest])
            .output()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("failed to run gsutil: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StorageError::UploadFailed(format!(
                "gsutil cp to {} failed: {}",
                dest,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Walk `local_dir` and pair every file with its object key under `prefix`
///
/// Keys use forward slashes regardless of platform. Files are returned
/// in sorted order so upload logs are stable.
pub fn plan_uploads(local_dir: &Path, prefix: &str) -> StorageResult<Vec<(PathBuf, String)>> {
    if !local_dir.is_dir() {
        return Err(StorageError::NotFound(local_dir.display().to_string()));
    }

    let mut files = Vec::new();
    collect_files(local_dir, &mut files)?;
    files.sort();

    let mut plan = Vec::with_capacity(files.len());
    for file in files {
        let relative = file.strip_prefix(local_dir).map_err(|_| {
            StorageError::InvalidPath(format!("{} escapes {}", file.display(), local_dir.display()))
        })?;

        let relative_key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let key = if prefix.is_empty() {
            relative_key
        } else {
            format!("{}/{}", prefix, relative_key)
        };

        plan.push((file, key));
    }

    Ok(plan)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> StorageResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tanren-gcs-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_plan_uploads_mirrors_layout() {
        let base = scratch_dir();
        std::fs::create_dir_all(base.join("checkpoint-50")).unwrap();
        std::fs::write(base.join("adapter_model.safetensors"), b"weights").unwrap();
        std::fs::write(base.join("adapter_config.json"), b"{}").unwrap();
        std::fs::write(base.join("checkpoint-50/adapter_model.safetensors"), b"w").unwrap();

        let plan = plan_uploads(&base, "final_model").unwrap();
        let keys: Vec<&str> = plan.iter().map(|(_, k)| k.as_str()).collect();

        assert_eq!(
            keys,
            vec![
                "final_model/adapter_config.json",
                "final_model/adapter_model.safetensors",
                "final_model/checkpoint-50/adapter_model.safetensors",
            ]
        );

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_plan_uploads_empty_prefix() {
        let base = scratch_dir();
        std::fs::create_dir_all(&base).unwrap();
        std::fs::write(base.join("a.txt"), b"a").unwrap();

        let plan = plan_uploads(&base, "").unwrap();
        assert_eq!(plan[0].1, "a.txt");

        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_plan_uploads_missing_dir() {
        let base = scratch_dir();
        assert!(plan_uploads(&base, "final_model").is_err());
    }

    #[test]
    fn test_from_config() {
        let gcs = StorageConfig::Gcs {
            bucket: "oreo-llama".to_string(),
            prefix: "final_model".to_string(),
        };
        let uploader = GcsUploader::from_config(&gcs).unwrap();
        assert_eq!(uploader.bucket(), "oreo-llama");
        assert_eq!(uploader.prefix(), "final_model");

        let local = StorageConfig::Local {
            base_path: ".".to_string(),
        };
        assert!(GcsUploader::from_config(&local).is_none());
    }
}
