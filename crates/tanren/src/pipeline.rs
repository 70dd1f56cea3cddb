//! Finetuning pipeline for Tanren
//!
//! Wires the stages together: base model setup, dataset preparation,
//! adapter training, local persistence, registry bookkeeping and the
//! GCS upload. Side effects after training (saving, registering,
//! uploading) run on the main process only.

use std::path::PathBuf;

use tanren_core::{
    CoreError, LoraParams, QuantMode, RunId, SharedTuner, TrainJob, TrainParams, TrainReport,
    Tuner,
};

use crate::base_model::{BaseModelError, BaseModelService};
use crate::config::TanrenConfig;
use crate::dataset::{DatasetError, DatasetService};
use crate::error::{Result, TanrenError};
use crate::lora::{LoraService, LoraStatus, TrainingInfo};
use crate::storage::GcsUploader;

/// True unless a distributed launcher gave this process a nonzero rank
///
/// Launchers that replicate the process set RANK / LOCAL_RANK; a bare
/// invocation has neither and counts as the main process.
pub fn is_main_process() -> bool {
    main_process_from(
        std::env::var("RANK").ok(),
        std::env::var("LOCAL_RANK").ok(),
    )
}

fn main_process_from(rank: Option<String>, local_rank: Option<String>) -> bool {
    let is_zero = |var: &Option<String>| match var {
        Some(value) => {
            let trimmed = value.trim();
            trimmed.is_empty() || trimmed == "0"
        }
        None => true,
    };
    is_zero(&rank) && is_zero(&local_rank)
}

/// What to finetune, on which data, with which hyperparameters
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Base model: registry name or HuggingFace repo id
    pub model: String,
    /// Dataset: registry name or HuggingFace dataset repo id
    pub dataset: String,
    /// Split fetched when the dataset is not local yet
    pub split: String,
    /// Cap on the number of samples used for training
    pub sample_limit: Option<usize>,
    /// Name the trained adapter is registered under
    pub adapter_name: String,
    /// Directory for checkpoints and the final adapter
    pub output_dir: PathBuf,
    /// Training hyperparameters
    pub params: TrainParams,
    /// Adapter shape
    pub lora: LoraParams,
    /// Base weight precision mode
    pub quant: QuantMode,
    /// Force CPU even when an accelerator is available
    pub force_cpu: bool,
}

impl Default for RunSpec {
    fn default() -> Self {
        Self {
            model: "meta-llama/Meta-Llama-3-8B-Instruct".to_string(),
            dataset: "databricks/databricks-dolly-15k".to_string(),
            split: "train".to_string(),
            sample_limit: Some(1000),
            adapter_name: "final_model".to_string(),
            output_dir: PathBuf::from("./results"),
            params: TrainParams::default(),
            lora: LoraParams::default(),
            quant: QuantMode::default(),
            force_cpu: false,
        }
    }
}

/// Report of one full pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: RunId,
    pub model_dir: PathBuf,
    pub samples: usize,
    pub train: TrainReport,
    pub adapter_dir: PathBuf,
    pub uploaded: Vec<String>,
    pub upload_skipped: bool,
}

/// The finetuning pipeline
pub struct FinetunePipeline {
    models: BaseModelService,
    datasets: DatasetService,
    loras: LoraService,
    tuner: SharedTuner,
    uploader: Option<GcsUploader>,
}

impl FinetunePipeline {
    /// Create a new builder
    pub fn builder() -> FinetunePipelineBuilder {
        FinetunePipelineBuilder::new()
    }

    /// Run the full pipeline
    pub async fn run(&self, spec: RunSpec) -> Result<PipelineReport> {
        let run_id = RunId::new();

        // Base model files
        let model_dir = self.resolve_model(&spec.model).await?;

        // Dataset, rendered to training texts
        let dataset_name = self.resolve_dataset(&spec.dataset, &spec.split).await?;
        let texts = self
            .datasets
            .prepare(&dataset_name, spec.sample_limit)
            .await?;
        if texts.is_empty() {
            return Err(TanrenError::Build(
                "Dataset produced no training samples".to_string(),
            ));
        }
        let samples = texts.len();
        let dataset_entry = self.datasets.get_by_name(&dataset_name).await?;

        // Track the adapter in the registry while it trains
        self.loras
            .register_pending(
                spec.adapter_name.clone(),
                Some(spec.model.clone()),
                spec.lora.rank,
                spec.lora.alpha,
                spec.quant == QuantMode::FourBit,
            )
            .await?;

        // Train
        let job = TrainJob {
            run_id: run_id.clone(),
            base_model_dir: model_dir.clone(),
            texts,
            output_dir: spec.output_dir.clone(),
            params: spec.params.clone(),
            lora: spec.lora.clone(),
            quant: spec.quant,
            force_cpu: spec.force_cpu,
        };

        let report = match self.tuner.train(job).await {
            Ok(report) if report.success => report,
            Ok(_) => {
                self.loras
                    .mark_status(&spec.adapter_name, LoraStatus::Error)
                    .await?;
                return Err(TanrenError::Core(CoreError::Training(
                    "Training did not run to completion".to_string(),
                )));
            }
            Err(e) => {
                // Keep the registry honest before bailing out
                let _ = self
                    .loras
                    .mark_status(&spec.adapter_name, LoraStatus::Error)
                    .await;
                return Err(e.into());
            }
        };

        let adapter_dir = spec.output_dir.join("final_model");
        let mut uploaded = Vec::new();
        let mut upload_skipped = true;

        if is_main_process() {
            // Persist the adapter locally
            self.tuner.save(&adapter_dir.to_string_lossy()).await?;
            println!("Model saved locally to {}", adapter_dir.display());

            let info = TrainingInfo {
                dataset: dataset_name.clone(),
                dataset_hash: dataset_entry.and_then(|d| d.hash),
                epochs: spec.params.num_epochs,
                batch_size: spec.params.batch_size,
                learning_rate: spec.params.learning_rate,
                final_loss: report.final_loss,
                duration_secs: Some(report.duration_secs),
            };
            self.loras
                .finalize_trained(&spec.adapter_name, &adapter_dir, info)
                .await?;

            // Mirror the saved directory into the bucket
            if let Some(uploader) = &self.uploader {
                uploaded = uploader.upload_dir(&adapter_dir).await?;
                println!(
                    "Successfully uploaded model to gs://{}/{}",
                    uploader.bucket(),
                    uploader.prefix()
                );
                upload_skipped = false;
            } else {
                println!("No GCS bucket configured, skipping upload");
            }
        } else {
            println!("Not the main process, skipping save and upload");
        }

        Ok(PipelineReport {
            run_id,
            model_dir,
            samples,
            train: report,
            adapter_dir,
            uploaded,
            upload_skipped,
        })
    }

    /// Smoke-test the tuned model with a short completion
    pub async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        Ok(self.tuner.generate(prompt, max_tokens).await?)
    }

    async fn resolve_model(&self, model: &str) -> Result<PathBuf> {
        match self.models.resolve_dir(model).await {
            Ok(dir) => Ok(dir),
            Err(BaseModelError::NotFound(_)) if model.contains('/') => {
                // A repo id that has not been set up yet
                let registered = self.models.setup(None, model, false).await?;
                Ok(self.models.resolve_dir(&registered.name).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve_dataset(&self, dataset: &str, split: &str) -> Result<String> {
        if let Some(existing) = self.datasets.get_by_name(dataset).await? {
            return Ok(existing.name);
        }
        if dataset.contains('/') {
            let fetched = self.datasets.fetch(None, dataset, split, false).await?;
            return Ok(fetched.name);
        }
        Err(TanrenError::Dataset(DatasetError::NotFound(
            dataset.to_string(),
        )))
    }
}

/// Builder for the finetuning pipeline
pub struct FinetunePipelineBuilder {
    config: TanrenConfig,
    models: Option<BaseModelService>,
    datasets: Option<DatasetService>,
    loras: Option<LoraService>,
    tuner: Option<SharedTuner>,
    uploader: Option<GcsUploader>,
}

impl FinetunePipelineBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            config: TanrenConfig::default(),
            models: None,
            datasets: None,
            loras: None,
            tuner: None,
            uploader: None,
        }
    }

    /// Set the config
    pub fn config(mut self, config: TanrenConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base model service
    pub fn models(mut self, models: BaseModelService) -> Self {
        self.models = Some(models);
        self
    }

    /// Set the dataset service
    pub fn datasets(mut self, datasets: DatasetService) -> Self {
        self.datasets = Some(datasets);
        self
    }

    /// Set the LoRA service
    pub fn loras(mut self, loras: LoraService) -> Self {
        self.loras = Some(loras);
        self
    }

    /// Set the tuner
    pub fn tuner(mut self, tuner: impl Tuner + 'static) -> Self {
        self.tuner = Some(std::sync::Arc::new(tuner));
        self
    }

    /// Set an already shared tuner
    pub fn shared_tuner(mut self, tuner: SharedTuner) -> Self {
        self.tuner = Some(tuner);
        self
    }

    /// Set the uploader explicitly
    pub fn uploader(mut self, uploader: GcsUploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> Result<FinetunePipeline> {
        let models = self
            .models
            .ok_or_else(|| TanrenError::Build("No base model service configured".to_string()))?;
        let datasets = self
            .datasets
            .ok_or_else(|| TanrenError::Build("No dataset service configured".to_string()))?;
        let loras = self
            .loras
            .ok_or_else(|| TanrenError::Build("No LoRA service configured".to_string()))?;
        let tuner = self
            .tuner
            .ok_or_else(|| TanrenError::Build("No tuner configured".to_string()))?;

        // Fall back to the config's upload target
        let uploader = self.uploader.or_else(|| {
            self.config
                .upload_target()
                .as_ref()
                .and_then(GcsUploader::from_config)
        });

        Ok(FinetunePipeline {
            models,
            datasets,
            loras,
            tuner,
            uploader,
        })
    }
}

impl Default for FinetunePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
