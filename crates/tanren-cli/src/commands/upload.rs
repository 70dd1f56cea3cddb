//! Upload command handler

use crate::commands::load_config;
use crate::error::CliError;
use std::path::Path;
use tanren::storage::GcsUploader;

pub async fn run_upload(
    dir: &str,
    bucket: Option<String>,
    prefix: Option<String>,
) -> Result<(), CliError> {
    let config = load_config();

    let dir = Path::new(dir);
    if !dir.is_dir() {
        return Err(CliError::InvalidInput(format!(
            "'{}' is not a directory",
            dir.display()
        )));
    }

    let bucket = bucket
        .or_else(|| config.gcs.bucket.clone())
        .or_else(|| std::env::var("TANREN_GCS_BUCKET").ok())
        .ok_or_else(|| {
            CliError::InvalidInput(
                "No GCS bucket configured. Pass --bucket or set gcs.bucket in tanren.json"
                    .to_string(),
            )
        })?;
    let prefix = prefix.unwrap_or_else(|| config.gcs.prefix.clone());

    println!("🚀 Uploading {} to gs://{}/{}...", dir.display(), bucket, prefix);

    let uploader = GcsUploader::new(bucket, prefix);
    let uploaded = uploader
        .upload_dir(dir)
        .await
        .map_err(|e| CliError::Core(e.to_string()))?;

    println!(
        "\n✅ Uploaded {} file(s) to gs://{}/{}",
        uploaded.len(),
        uploader.bucket(),
        uploader.prefix()
    );

    Ok(())
}
