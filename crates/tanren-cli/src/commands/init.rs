//! Init command handler

use crate::error::CliError;
use std::fs;
use std::path::Path;
use tanren::config::TanrenConfig;

pub async fn run_init() -> Result<(), CliError> {
    println!("🚀 Initializing Tanren project...");

    // Create project structure
    let dirs = vec!["models", "datasets", "loras", "results"];

    for dir in dirs {
        let path = Path::new(dir);
        if !path.exists() {
            println!("📁 Creating {} directory...", dir);
            fs::create_dir_all(path)
                .map_err(|e| CliError::InvalidInput(format!("Failed to create {}: {}", dir, e)))?;
        } else {
            println!("✅ {} directory already exists", dir);
        }
    }

    // Write a starter config if it doesn't exist
    let config_path = Path::new("tanren.json");
    if !config_path.exists() {
        println!("📝 Creating tanren.json...");
        let content = serde_json::to_string_pretty(&TanrenConfig::default())
            .map_err(|e| CliError::InvalidInput(format!("Failed to serialize config: {}", e)))?;
        fs::write(config_path, content)
            .map_err(|e| CliError::InvalidInput(format!("Failed to create tanren.json: {}", e)))?;
    }

    // Create a sample .env file if it doesn't exist
    let env_path = Path::new(".env");
    if !env_path.exists() {
        println!("📝 Creating .env file...");
        let env_content = r#"# Tanren Configuration
# Add your environment variables here
# HF_TOKEN=hf_...
# GOOGLE_APPLICATION_CREDENTIALS=/path/to/credentials.json
# TANREN_GCS_BUCKET=oreo-llama
# RANK is set by distributed launchers; leave unset for single-process runs
"#;
        fs::write(env_path, env_content)
            .map_err(|e| CliError::InvalidInput(format!("Failed to create .env: {}", e)))?;
    }

    println!("\n✨ Tanren project initialized successfully!");
    println!("\nNext steps:");
    println!("  1. Run 'tanren setup meta-llama/Meta-Llama-3-8B-Instruct' to download a base model");
    println!("  2. Run 'tanren train' to finetune a LoRA adapter");

    Ok(())
}
