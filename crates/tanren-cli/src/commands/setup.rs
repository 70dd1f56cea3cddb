//! Setup command handler

use crate::commands::{load_config, model_service};
use crate::error::CliError;
use std::fs;
use std::path::Path;
use tanren::base_model::BaseModelMetadata;
use tanren::config::TanrenConfig;

pub async fn run_setup(
    list: bool,
    force: bool,
    name: Option<String>,
    repo_id: Option<String>,
) -> Result<(), CliError> {
    let config = load_config();

    if list {
        return list_downloaded_models(&config);
    }

    // A single positional that looks like a repo id is one
    let (name, repo_id) = match (name, repo_id) {
        (Some(name), Some(repo_id)) => (Some(name), repo_id),
        (Some(only), None) if only.contains('/') => (None, only),
        (Some(only), None) => {
            return Err(CliError::InvalidInput(format!(
                "'{}' is not a HuggingFace repo id. Usage: tanren setup [NAME] <REPO_ID>",
                only
            )));
        }
        (None, _) => {
            println!("🎯 No model specified. Use one of the following:");
            println!("  tanren setup <repo_id>           # Download a model from HuggingFace");
            println!("  tanren setup <name> <repo_id>    # Download under a custom name");
            println!("  tanren setup --list              # Show downloaded models");
            return Ok(());
        }
    };

    let service = model_service(&config);

    println!("🤖 Downloading model from {}...", repo_id);
    let model = service
        .setup(name, &repo_id, force)
        .await
        .map_err(|e| CliError::Core(e.to_string()))?;

    println!("✅ Downloaded {} successfully!", model.name);
    if let Some(dir) = &model.local_dir {
        println!("📁 Location: {}", dir);
    }
    if let Some(size_mb) = model.size_mb {
        println!("💾 Size: {} MB", size_mb);
    }
    println!("\n🎉 Setup complete! Train with: tanren train -m {}", model.name);

    Ok(())
}

fn list_downloaded_models(config: &TanrenConfig) -> Result<(), CliError> {
    let models_dir = Path::new(&config.base_dir).join(&config.models_dir);
    if !models_dir.exists() {
        println!("📁 No models directory found. Run 'tanren setup <repo_id>' first.");
        return Ok(());
    }

    println!("📦 Downloaded models:");
    println!("===================");
    println!();

    let mut found = false;
    for entry in fs::read_dir(&models_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let meta_path = path.join("meta.toml");
        if meta_path.exists() {
            match fs::read_to_string(&meta_path)
                .ok()
                .and_then(|content| toml::from_str::<BaseModelMetadata>(&content).ok())
            {
                Some(metadata) => {
                    println!(
                        "  {} - {}",
                        metadata.name,
                        metadata.description.as_deref().unwrap_or("No description")
                    );
                    println!("       Repo: {}", metadata.repo_id);
                    if let Some(arch) = &metadata.architecture {
                        println!("       Architecture: {}", arch);
                    }
                    if let Some(params) = &metadata.parameters {
                        println!("       Size: {}", params);
                    }
                    if let Some(downloaded_at) = &metadata.downloaded_at {
                        println!("       Downloaded: {}", downloaded_at);
                    }
                }
                None => {
                    if let Some(dirname) = path.file_name().and_then(|s| s.to_str()) {
                        println!("  {} (metadata error)", dirname);
                    }
                }
            }
            println!();
            found = true;
        } else if path.join("config.json").exists() {
            // A model directory that was downloaded by hand
            if let Some(dirname) = path.file_name().and_then(|s| s.to_str()) {
                println!("  {} (no metadata)", dirname);
                println!();
                found = true;
            }
        }
    }

    if !found {
        println!("  No models found. Run 'tanren setup <repo_id>' to download one.");
        println!();
    }

    println!("To download more models:");
    println!("  tanren setup <repo_id>");
    println!();
    println!("To train with a model:");
    println!("  tanren train -m <model_name>");

    Ok(())
}
