//! Adapter registry command handlers

use crate::commands::{format_size, load_config};
use crate::error::CliError;
use std::fs;
use std::path::Path;
use tanren::lora::Lora;

pub async fn lora_list() -> Result<(), CliError> {
    println!("📋 Listing trained adapters...\n");

    let config = load_config();
    let loras_dir = Path::new(&config.base_dir).join(&config.loras_dir);
    if !loras_dir.exists() {
        println!("❌ No adapters directory found. Train one with: tanren train");
        return Ok(());
    }

    let mut adapters = Vec::new();
    for entry in fs::read_dir(&loras_dir)? {
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
        let Ok(lora) = toml::from_str::<Lora>(&content) else {
            continue;
        };
        let weights_exist = path.join("adapter_model.safetensors").exists();
        adapters.push((lora, weights_exist));
    }

    if adapters.is_empty() {
        println!("No adapters found. Train one with: tanren train");
        return Ok(());
    }

    println!("Found {} adapter(s):", adapters.len());
    println!("─────────────────────────────────────────");
    for (lora, weights_exist) in adapters {
        println!("📦 {} [{}]", lora.name, lora.status);
        if let Some(base) = &lora.metadata.base_model {
            println!("   🧠 Base: {}", base);
        }
        if let (Some(rank), Some(alpha)) = (lora.metadata.rank, lora.metadata.alpha) {
            println!("   🔢 Rank: {} (alpha {})", rank, alpha);
        }
        if let Some(info) = &lora.metadata.training_info {
            println!("   📚 Dataset: {}", info.dataset);
        }
        if !weights_exist {
            println!("   ⚠️  adapter_model.safetensors missing!");
        }
        println!();
    }

    Ok(())
}

pub async fn lora_show(name: &str) -> Result<(), CliError> {
    let config = load_config();
    let lora_dir = Path::new(&config.base_dir)
        .join(&config.loras_dir)
        .join(name);
    if !lora_dir.exists() {
        return Err(CliError::InvalidInput(format!(
            "Adapter '{}' not found",
            name
        )));
    }

    let meta_path = lora_dir.join("meta.toml");
    if !meta_path.exists() {
        return Err(CliError::InvalidInput(format!(
            "Metadata not found for adapter '{}'",
            name
        )));
    }

    let content = fs::read_to_string(&meta_path)?;
    let lora: Lora = toml::from_str(&content)
        .map_err(|e| CliError::InvalidInput(format!("Failed to parse metadata: {}", e)))?;

    println!("📦 Adapter: {}", lora.name);
    println!("─────────────────────────────────────────");
    println!("🏷️  Status: {}", lora.status);
    if let Some(base) = &lora.metadata.base_model {
        println!("🧠 Base model: {}", base);
    }
    if let Some(rank) = lora.metadata.rank {
        println!("🔢 Rank: {}", rank);
    }
    if let Some(alpha) = lora.metadata.alpha {
        println!("🔢 Alpha: {}", alpha);
    }
    if let Some(quantized) = lora.metadata.quantized_base {
        println!("🧮 Quantized base: {}", quantized);
    }
    if let Some(info) = &lora.metadata.training_info {
        println!("📚 Dataset: {}", info.dataset);
        println!("🔁 Epochs: {} (batch size {})", info.epochs, info.batch_size);
        println!("📈 Learning rate: {}", info.learning_rate);
        if let Some(loss) = info.final_loss {
            println!("📉 Final loss: {:.4}", loss);
        }
        if let Some(secs) = info.duration_secs {
            println!("⏱️  Duration: {}s", secs);
        }
    }
    println!("📅 Created: {}", lora.created_at);
    println!("📁 Location: {}", lora_dir.display());

    let weights = lora_dir.join("adapter_model.safetensors");
    if weights.exists() {
        if let Ok(meta) = fs::metadata(&weights) {
            println!("💾 Weights: {}", format_size(meta.len()));
        }
    } else {
        println!("⚠️  Adapter weights (adapter_model.safetensors) are missing!");
    }

    Ok(())
}

pub async fn lora_remove(name: &str, keep_files: bool) -> Result<(), CliError> {
    let config = load_config();
    let lora_dir = Path::new(&config.base_dir)
        .join(&config.loras_dir)
        .join(name);
    if !lora_dir.exists() {
        return Err(CliError::InvalidInput(format!(
            "Adapter '{}' not found",
            name
        )));
    }

    if keep_files {
        println!("📁 Keeping the adapter files...");

        // Just remove the metadata to unregister it
        let meta_path = lora_dir.join("meta.toml");
        if meta_path.exists() {
            fs::remove_file(&meta_path)
                .map_err(|e| CliError::InvalidInput(format!("Failed to remove metadata: {}", e)))?;
        }

        println!(
            "✅ Adapter '{}' unregistered (files kept in {})",
            name,
            lora_dir.display()
        );
    } else {
        println!("🗑️  Removing adapter '{}' and all its files...", name);

        fs::remove_dir_all(&lora_dir).map_err(|e| {
            CliError::InvalidInput(format!("Failed to remove adapter directory: {}", e))
        })?;

        println!("✅ Adapter '{}' removed completely", name);
    }

    Ok(())
}
