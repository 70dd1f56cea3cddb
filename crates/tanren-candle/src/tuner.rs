//! Tuner implementation backed by the candle training engine
//!
//! Holds the trained model behind a mutex so `save` and `generate` can
//! run after `train` through the shared trait object.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use tanren_core::{
    ComputeDtype, CoreError, Result, TrainJob, TrainReport, Tuner, TunerMetadata,
};
use tokenizers::Tokenizer;

use crate::error::CandleError;
use crate::llama::{Cache, Llama, LlamaConfig};
use crate::lora::LoraSpec;
use crate::trainer::{SftTrainer, save_adapter};

const GENERATION_SEED: u64 = 42;

/// LoRA finetuning on candle, the default engine
pub struct CandleLoraTuner {
    state: Mutex<Option<TrainedState>>,
}

struct TrainedState {
    model: Llama,
    tokenizer: Tokenizer,
    varmap: candle_nn::VarMap,
    config: LlamaConfig,
    spec: LoraSpec,
    base_model_dir: PathBuf,
    eos_ids: Vec<u32>,
    device: Device,
    dtype: DType,
}

impl TrainedState {
    /// Greedy-ish sampling loop with the KV cache on
    fn generate(&self, prompt: &str, max_tokens: usize) -> std::result::Result<String, CandleError> {
        let encoding = self.tokenizer.encode(prompt, true)?;
        let mut all_tokens: Vec<u32> = encoding.get_ids().to_vec();
        if all_tokens.is_empty() {
            return Err(CandleError::Config("empty prompt".to_string()));
        }

        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut logits_processor = LogitsProcessor::new(GENERATION_SEED, None, None);
        let mut generated: Vec<u32> = Vec::new();
        let mut index_pos = 0;

        for i in 0..max_tokens {
            // After the prompt pass, only the newest token goes in
            let context_size = if i > 0 { 1 } else { all_tokens.len() };
            let ctxt = &all_tokens[all_tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = self.model.next_token_logits(&input, index_pos, &mut cache)?;
            let logits = logits.to_dtype(DType::F32)?;
            index_pos += ctxt.len();

            let next_token = logits_processor.sample(&logits)?;
            if self.eos_ids.contains(&next_token) {
                break;
            }
            all_tokens.push(next_token);
            generated.push(next_token);
        }

        Ok(self.tokenizer.decode(&generated, true)?)
    }
}

impl CandleLoraTuner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    fn state_lock(&self) -> Result<MutexGuard<'_, Option<TrainedState>>> {
        self.state
            .lock()
            .map_err(|_| CoreError::Training("tuner state lock poisoned".to_string()))
    }
}

impl Default for CandleLoraTuner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tuner for CandleLoraTuner {
    async fn train(&self, job: TrainJob) -> Result<TrainReport> {
        let start = Instant::now();

        let device = if job.force_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available(0).map_err(CandleError::from)?
        };
        let dtype = match job.params.compute_dtype {
            ComputeDtype::Bf16 => DType::BF16,
            ComputeDtype::F16 => DType::F16,
            ComputeDtype::F32 => DType::F32,
        };
        let spec = LoraSpec::from(&job.lora);

        let trainer = SftTrainer::new(
            job.params.clone(),
            spec.clone(),
            job.quant,
            device.clone(),
            dtype,
        );
        let outcome = trainer.train(&job.base_model_dir, &job.texts, &job.output_dir)?;
        let duration_secs = start.elapsed().as_secs();

        let mut metrics = HashMap::new();
        metrics.insert("train_loss".to_string(), outcome.final_loss);
        metrics.insert(
            "learning_rate".to_string(),
            job.params.learning_rate as f32,
        );
        let report = TrainReport {
            success: true,
            final_loss: Some(outcome.final_loss),
            steps: outcome.steps,
            duration_secs,
            metrics,
            messages: vec![format!(
                "trained rank {} adapter on {} samples in {} steps",
                spec.rank,
                job.texts.len(),
                outcome.steps
            )],
        };

        let state = TrainedState {
            model: outcome.model,
            tokenizer: outcome.tokenizer,
            varmap: outcome.varmap,
            config: outcome.config,
            spec,
            base_model_dir: job.base_model_dir.clone(),
            eos_ids: outcome.eos_ids,
            device,
            dtype,
        };
        *self.state_lock()? = Some(state);

        Ok(report)
    }

    async fn save(&self, path: &str) -> Result<()> {
        let guard = self.state_lock()?;
        let state = guard.as_ref().ok_or(CandleError::ModelNotLoaded)?;
        save_adapter(
            &state.varmap,
            &state.spec,
            Path::new(path),
            &state.base_model_dir.to_string_lossy(),
        )?;
        Ok(())
    }

    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String> {
        let guard = self.state_lock()?;
        let state = guard.as_ref().ok_or(CandleError::ModelNotLoaded)?;
        Ok(state.generate(prompt, max_tokens)?)
    }

    fn metadata(&self) -> TunerMetadata {
        TunerMetadata {
            name: Some("CandleLoraTuner".to_string()),
            tuning_type: Some("LoRA".to_string()),
            description: Some(
                "LoRA finetuning for Llama models on candle, with optional 4-bit quantized base weights"
                    .to_string(),
            ),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            supported_models: vec!["llama".to_string()],
            capabilities: vec![
                "peft_compatible".to_string(),
                "safetensors".to_string(),
                "4bit_quantization".to_string(),
            ],
        }
    }
}
