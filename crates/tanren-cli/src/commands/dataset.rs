//! Dataset command handlers

use crate::commands::{dataset_service, format_size, load_config};
use crate::error::CliError;
use std::fs;
use std::path::Path;
use tanren::dataset::Dataset;

pub async fn dataset_fetch(
    repo_id: &str,
    name: Option<String>,
    split: &str,
    force: bool,
) -> Result<(), CliError> {
    let config = load_config();
    let service = dataset_service(&config);

    println!("📥 Fetching dataset from {}...", repo_id);
    let dataset = service
        .fetch(name, repo_id, split, force)
        .await
        .map_err(|e| CliError::Core(e.to_string()))?;

    println!("✅ Fetched '{}' successfully!", dataset.name);
    if let Some(count) = dataset.sample_count {
        println!("📝 Samples: {}", count);
    }
    if let Some(path) = &dataset.file_path {
        println!("📁 Location: {}", path);
    }

    Ok(())
}

pub async fn dataset_list() -> Result<(), CliError> {
    println!("📋 Listing fetched datasets...\n");

    let config = load_config();
    let datasets_dir = Path::new(&config.base_dir).join(&config.datasets_dir);
    if !datasets_dir.exists() {
        println!("❌ No datasets directory found. Fetch one with: tanren dataset fetch <repo_id>");
        return Ok(());
    }

    let mut datasets = Vec::new();
    for entry in fs::read_dir(&datasets_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let meta_path = path.join("meta.toml");
        if !meta_path.exists() {
            continue;
        }
        let Ok(content) = fs::read_to_string(&meta_path) else {
            continue;
        };
        let Ok(dataset) = toml::from_str::<Dataset>(&content) else {
            continue;
        };
        datasets.push(dataset);
    }

    if datasets.is_empty() {
        println!("No datasets found. Fetch one with: tanren dataset fetch <repo_id>");
        return Ok(());
    }

    println!("Found {} dataset(s):", datasets.len());
    println!("─────────────────────────────────────────");
    for dataset in datasets {
        println!("📦 {}", dataset.name);
        if let Some(repo_id) = &dataset.repo_id {
            println!("   🌐 Repo: {} ({})", repo_id, dataset.split);
        }
        if let Some(count) = dataset.sample_count {
            println!("   📝 Samples: {}", count);
        }
        if let Some(size) = dataset.size_bytes {
            println!("   💾 Size: {}", format_size(size));
        }
        println!();
    }

    Ok(())
}

pub async fn dataset_show(name: &str) -> Result<(), CliError> {
    let config = load_config();
    let meta_path = Path::new(&config.base_dir)
        .join(&config.datasets_dir)
        .join(name)
        .join("meta.toml");
    if !meta_path.exists() {
        return Err(CliError::InvalidInput(format!(
            "Dataset '{}' not found",
            name
        )));
    }

    let content = fs::read_to_string(&meta_path)?;
    let dataset: Dataset = toml::from_str(&content)
        .map_err(|e| CliError::InvalidInput(format!("Failed to parse metadata: {}", e)))?;

    println!("📦 Dataset: {}", dataset.name);
    println!("─────────────────────────────────────────");
    if let Some(desc) = &dataset.description {
        println!("📝 {}", desc);
    }
    if let Some(repo_id) = &dataset.repo_id {
        println!("🌐 Repo: {}", repo_id);
    }
    println!("🔀 Split: {}", dataset.split);
    if let Some(count) = dataset.sample_count {
        println!("📊 Samples: {}", count);
    }
    if let Some(size) = dataset.size_bytes {
        println!("💾 Size: {}", format_size(size));
    }
    if let Some(hash) = &dataset.hash {
        println!("🔑 SHA-256: {}", hash);
    }
    if let Some(path) = &dataset.file_path {
        let file = Path::new(&config.base_dir).join(path);
        if file.exists() {
            println!("📁 File: {}", file.display());
        } else {
            println!("⚠️  Data file missing: {}", file.display());
        }
    }
    println!("📅 Updated: {}", dataset.updated_at);

    Ok(())
}

pub async fn dataset_remove(name: &str) -> Result<(), CliError> {
    let config = load_config();
    let data_dir = Path::new(&config.base_dir)
        .join(&config.datasets_dir)
        .join(name);
    if !data_dir.exists() {
        return Err(CliError::InvalidInput(format!(
            "Dataset '{}' not found",
            name
        )));
    }

    println!("🗑️  Removing dataset '{}' and its files...", name);
    fs::remove_dir_all(&data_dir)?;
    println!("✅ Dataset '{}' removed", name);

    Ok(())
}
