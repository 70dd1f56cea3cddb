//! Train command implementation

use std::path::PathBuf;

use tanren::config::TanrenConfig;
use tanren::pipeline::{FinetunePipeline, RunSpec};
use tanren::storage::GcsUploader;
use tanren::{LoraParams, QuantMode, TrainParams};
use tanren_candle::CandleLoraTuner;

use crate::commands::{dataset_service, load_config, lora_service, model_service};
use crate::error::CliError;

/// Options for one training run
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub model: String,
    pub dataset: String,
    pub name: String,
    pub output: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub rank: usize,
    pub alpha: f32,
    pub sample_limit: usize,
    pub max_steps: usize,
    pub no_quantize: bool,
    pub cpu: bool,
    pub test: bool,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
}

pub async fn run_train(options: TrainOptions) -> Result<(), CliError> {
    println!("🎯 Starting LoRA finetuning...\n");

    let config = load_config();

    let params = TrainParams {
        num_epochs: options.epochs,
        batch_size: options.batch_size,
        learning_rate: options.learning_rate,
        max_steps: (options.max_steps > 0).then_some(options.max_steps),
        ..TrainParams::default()
    };
    let lora = LoraParams {
        rank: options.rank,
        alpha: options.alpha,
        ..LoraParams::default()
    };
    let quant = if options.no_quantize {
        QuantMode::None
    } else {
        QuantMode::FourBit
    };

    let spec = RunSpec {
        model: options.model.clone(),
        dataset: options.dataset.clone(),
        split: "train".to_string(),
        sample_limit: (options.sample_limit > 0).then_some(options.sample_limit),
        adapter_name: options.name.clone(),
        output_dir: PathBuf::from(&options.output),
        params,
        lora,
        quant,
        force_cpu: options.cpu,
    };

    println!("📝 Training configuration:");
    println!("  Model: {}", spec.model);
    println!("  Dataset: {}", spec.dataset);
    println!("  Adapter name: {}", spec.adapter_name);
    println!("  Epochs: {}", spec.params.num_epochs);
    if let Some(max_steps) = spec.params.max_steps {
        println!("  Max steps: {}", max_steps);
    }
    println!("  Batch size: {}", spec.params.batch_size);
    println!("  Learning rate: {}", spec.params.learning_rate);
    println!("  LoRA rank: {} (alpha {})", spec.lora.rank, spec.lora.alpha);
    println!("  4-bit base: {}", spec.quant == QuantMode::FourBit);
    println!("  Output: {}\n", spec.output_dir.display());

    let pipeline = build_pipeline(&config, &options)?;

    println!("⚡ Running the finetuning pipeline...\n");
    let report = pipeline
        .run(spec)
        .await
        .map_err(|e| CliError::Core(e.to_string()))?;

    println!("\n✅ Training completed successfully!");
    println!("  Samples: {}", report.samples);
    println!("  Steps: {}", report.train.steps);
    if let Some(loss) = report.train.final_loss {
        println!("  Final loss: {:.4}", loss);
    }
    println!("  Duration: {}s", report.train.duration_secs);
    println!("📁 Adapter saved to: {}", report.adapter_dir.display());

    if options.test {
        println!("\n🧪 Testing the tuned model...");
        let prompt = "### Instruction:\nName three primary colors.\n\n### Response:\n";
        let completion = pipeline
            .generate(prompt, 100)
            .await
            .map_err(|e| CliError::Core(e.to_string()))?;
        println!("{}", completion);
    }

    if report.upload_skipped {
        println!("\nFine-tuning complete!");
    } else {
        println!("\nFine-tuning and GCS upload complete!");
    }

    Ok(())
}

fn build_pipeline(
    config: &TanrenConfig,
    options: &TrainOptions,
) -> Result<FinetunePipeline, CliError> {
    let mut builder = FinetunePipeline::builder()
        .config(config.clone())
        .models(model_service(config))
        .datasets(dataset_service(config))
        .loras(lora_service(config))
        .tuner(CandleLoraTuner::new());

    // Bucket resolution: flag first, then config, then environment
    let bucket = options
        .bucket
        .clone()
        .or_else(|| config.gcs.bucket.clone())
        .or_else(|| std::env::var("TANREN_GCS_BUCKET").ok());

    match bucket {
        Some(bucket) => {
            let prefix = options
                .prefix
                .clone()
                .unwrap_or_else(|| config.gcs.prefix.clone());
            builder = builder.uploader(GcsUploader::new(bucket, prefix));
        }
        None if options.prefix.is_some() => {
            return Err(CliError::InvalidInput(
                "No GCS bucket configured. Pass --bucket or set gcs.bucket in tanren.json"
                    .to_string(),
            ));
        }
        None => {}
    }

    builder.build().map_err(|e| CliError::Core(e.to_string()))
}
