//! Tuner trait and job types for tanren-core
//!
//! This module defines the core abstraction for parameter-efficient
//! finetuning. Backends implement [`Tuner`] and receive a fully
//! resolved [`TrainJob`]; everything upstream (model download, dataset
//! rendering, registries) stays out of the backend's way.

use crate::{Result, RunId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Core trait for model finetuning
///
/// Implementations own the model state. `train` consumes a job and
/// returns a report; `save` persists the trained adapter; `generate`
/// runs a quick completion for smoke-testing the result.
#[async_trait]
pub trait Tuner: Send + Sync {
    /// Run a full finetuning job
    async fn train(&self, job: TrainJob) -> Result<TrainReport>;

    /// Save the trained adapter weights to a directory
    async fn save(&self, path: &str) -> Result<()>;

    /// Generate a completion with the tuned model
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String>;

    /// Get tuner metadata
    fn metadata(&self) -> TunerMetadata {
        TunerMetadata::default()
    }
}

/// Numeric precision for frozen weights and activations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDtype {
    Bf16,
    F16,
    F32,
}

/// Precision mode for the frozen base weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantMode {
    /// Keep base weights in the compute dtype
    None,
    /// Quantize base linear weights into 4-bit blocks
    #[default]
    FourBit,
}

/// Hyperparameters for a finetuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainParams {
    /// Number of passes over the training set
    pub num_epochs: usize,
    /// Samples per optimizer micro-batch
    pub batch_size: usize,
    /// Micro-batches accumulated per optimizer step
    pub gradient_accumulation_steps: usize,
    /// Peak learning rate
    pub learning_rate: f64,
    /// AdamW weight decay
    pub weight_decay: f64,
    /// Global gradient norm clip threshold
    pub max_grad_norm: f64,
    /// Hard cap on optimizer steps, overrides epochs when set
    pub max_steps: Option<usize>,
    /// Fraction of total steps spent warming the learning rate up
    pub warmup_ratio: f64,
    /// Batch samples of similar token length together
    pub group_by_length: bool,
    /// Checkpoint every this many optimizer steps
    pub save_steps: usize,
    /// Log loss every this many optimizer steps
    pub logging_steps: usize,
    /// Token truncation length per sample
    pub max_seq_len: usize,
    /// Seed for shuffling and adapter initialization
    pub seed: u64,
    /// Precision for frozen weights and activations
    pub compute_dtype: ComputeDtype,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            num_epochs: 1,
            batch_size: 4,
            gradient_accumulation_steps: 1,
            learning_rate: 2e-4,
            weight_decay: 0.001,
            max_grad_norm: 0.3,
            max_steps: None,
            warmup_ratio: 0.03,
            group_by_length: true,
            save_steps: 50,
            logging_steps: 10,
            max_seq_len: 512,
            seed: 42,
            compute_dtype: ComputeDtype::Bf16,
        }
    }
}

/// LoRA adapter shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoraParams {
    /// Rank of the low-rank update matrices
    pub rank: usize,
    /// Scaling numerator, effective scale is alpha / rank
    pub alpha: f32,
    /// Dropout on the adapter input during training
    pub dropout: f32,
    /// Projection names to wrap with adapters
    pub target_modules: Vec<String>,
}

impl Default for LoraParams {
    fn default() -> Self {
        Self {
            rank: 64,
            alpha: 16.0,
            dropout: 0.1,
            target_modules: vec![
                "q_proj".to_string(),
                "k_proj".to_string(),
                "v_proj".to_string(),
                "o_proj".to_string(),
                "gate_proj".to_string(),
                "up_proj".to_string(),
                "down_proj".to_string(),
            ],
        }
    }
}

/// Everything a tuner needs to run one finetuning job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainJob {
    /// Identity of this run
    pub run_id: RunId,
    /// Directory holding base weights, tokenizer.json and config.json
    pub base_model_dir: PathBuf,
    /// Rendered training texts, one per sample
    pub texts: Vec<String>,
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

impl TrainJob {
    /// Create a job with default hyperparameters
    pub fn new(
        base_model_dir: impl Into<PathBuf>,
        texts: Vec<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            base_model_dir: base_model_dir.into(),
            texts,
            output_dir: output_dir.into(),
            params: TrainParams::default(),
            lora: LoraParams::default(),
            quant: QuantMode::default(),
            force_cpu: false,
        }
    }
}

/// Outcome of a finetuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    /// Whether training ran to completion
    pub success: bool,
    /// Mean loss over the final logging window
    pub final_loss: Option<f32>,
    /// Optimizer steps actually taken
    pub steps: usize,
    /// Wall-clock training time in seconds
    pub duration_secs: u64,
    /// Additional metrics
    pub metrics: HashMap<String, f32>,
    /// Any messages or logs
    pub messages: Vec<String>,
}

/// Metadata about a tuner
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunerMetadata {
    /// Human-readable name of the tuner
    pub name: Option<String>,
    /// Type of tuning method (e.g., "LoRA", "QLoRA")
    pub tuning_type: Option<String>,
    /// Description of what this tuner does
    pub description: Option<String>,
    /// Version information
    pub version: Option<String>,
    /// Supported model architectures
    pub supported_models: Vec<String>,
    /// Additional capabilities or features
    pub capabilities: Vec<String>,
}

/// Arc-wrapped tuner for thread-safe sharing
pub type SharedTuner = Arc<dyn Tuner>;

/// Extension trait for tuner wrapping
pub trait TunerExt: Tuner {
    /// Convert to a shared tuner
    fn shared(self) -> SharedTuner
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

// Implement TunerExt for all types that implement Tuner
impl<T: Tuner> TunerExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mock tuner for testing
    struct MockTuner {
        lora: LoraParams,
    }

    #[async_trait]
    impl Tuner for MockTuner {
        async fn train(&self, job: TrainJob) -> Result<TrainReport> {
            Ok(TrainReport {
                success: true,
                final_loss: Some(0.5),
                steps: job.texts.len(),
                duration_secs: 1,
                metrics: vec![("tokens_per_sec".to_string(), 128.0)]
                    .into_iter()
                    .collect(),
                messages: vec![format!("trained rank {} adapter", self.lora.rank)],
            })
        }

        async fn save(&self, _path: &str) -> Result<()> {
            Ok(())
        }

        async fn generate(&self, prompt: &str, _max_tokens: usize) -> Result<String> {
            Ok(prompt.to_string())
        }

        fn metadata(&self) -> TunerMetadata {
            TunerMetadata {
                name: Some("MockTuner".to_string()),
                tuning_type: Some("LoRA".to_string()),
                description: Some("Mock tuner for testing".to_string()),
                ..Default::default()
            }
        }
    }

    #[tokio::test]
    async fn test_basic_tuner() {
        let tuner = MockTuner {
            lora: LoraParams::default(),
        };

        let job = TrainJob::new(
            "models/test",
            vec!["### Instruction:\nHi\n\n### Response:\nHello".to_string()],
            "./results",
        );

        let report = tuner.train(job).await.unwrap();
        assert!(report.success);
        assert_eq!(report.final_loss, Some(0.5));
        assert_eq!(report.steps, 1);
    }

    #[tokio::test]
    async fn test_shared_tuner() {
        let shared: SharedTuner = MockTuner {
            lora: LoraParams::default(),
        }
        .shared();
        assert_eq!(shared.metadata().name, Some("MockTuner".to_string()));
    }

    #[test]
    fn test_train_params_defaults() {
        let params = TrainParams::default();
        assert_eq!(params.num_epochs, 1);
        assert_eq!(params.batch_size, 4);
        assert_eq!(params.gradient_accumulation_steps, 1);
        assert_eq!(params.learning_rate, 2e-4);
        assert_eq!(params.weight_decay, 0.001);
        assert_eq!(params.max_grad_norm, 0.3);
        assert_eq!(params.max_steps, None);
        assert_eq!(params.warmup_ratio, 0.03);
        assert!(params.group_by_length);
        assert_eq!(params.save_steps, 50);
        assert_eq!(params.logging_steps, 10);
        assert_eq!(params.max_seq_len, 512);
        assert_eq!(params.compute_dtype, ComputeDtype::Bf16);
    }

    #[test]
    fn test_lora_params_defaults() {
        let lora = LoraParams::default();
        assert_eq!(lora.rank, 64);
        assert_eq!(lora.alpha, 16.0);
        assert_eq!(lora.dropout, 0.1);
        assert_eq!(lora.target_modules.len(), 7);
        assert!(lora.target_modules.contains(&"q_proj".to_string()));
        assert!(lora.target_modules.contains(&"down_proj".to_string()));
    }

    #[test]
    fn test_quant_mode_default_is_four_bit() {
        assert_eq!(QuantMode::default(), QuantMode::FourBit);
    }
}
