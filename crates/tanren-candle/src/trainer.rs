//! SFT training loop for LoRA adapters
//!
//! Loads frozen base weights from a model directory, attaches trainable
//! adapters, and runs next-token cross-entropy over rendered
//! instruction texts. Mirrors the usual SFT recipe: right padding,
//! optional length grouping, linear warmup into a constant learning
//! rate, global gradient norm clipping, periodic checkpoints.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::backprop::GradStore;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use tanren_core::{QuantMode, TrainParams};
use tokenizers::{AddedToken, Tokenizer};

use crate::error::CandleError;
use crate::llama::{Cache, Llama, LlamaConfig};
use crate::lora::{LoraSpec, PeftConfig};

const PAD_TOKEN: &str = "[PAD]";

/// Runs one finetuning job over a base model directory
pub struct SftTrainer {
    params: TrainParams,
    spec: LoraSpec,
    quant: QuantMode,
    device: Device,
    dtype: DType,
}

/// Everything the caller needs after training: the tuned model for
/// generation, the varmap for persisting the adapter, and run stats
pub struct TrainOutcome {
    pub model: Llama,
    pub tokenizer: Tokenizer,
    pub varmap: VarMap,
    pub config: LlamaConfig,
    pub final_loss: f32,
    pub steps: usize,
    pub eos_ids: Vec<u32>,
}

/// One collated micro-batch, right padded
struct Batch {
    /// (batch, seq) token ids
    inputs: Tensor,
    /// Next-token targets at the kept positions
    targets: Tensor,
    /// Indices into the flattened (batch * (seq - 1)) logits
    keep: Tensor,
    /// (batch, 1, 1, seq) padding mask, None when nothing is padded
    mask: Option<Tensor>,
}

impl SftTrainer {
    pub fn new(
        params: TrainParams,
        spec: LoraSpec,
        quant: QuantMode,
        device: Device,
        dtype: DType,
    ) -> Self {
        Self {
            params,
            spec,
            quant,
            device,
            dtype,
        }
    }

    pub fn train(
        &self,
        base_model_dir: &Path,
        texts: &[String],
        output_dir: &Path,
    ) -> Result<TrainOutcome, CandleError> {
        let cfg = LlamaConfig::from_dir(base_model_dir)?;
        let mut tokenizer = Tokenizer::from_file(base_model_dir.join("tokenizer.json"))?;

        let (pad_id, pad_added) = ensure_pad_token(&mut tokenizer)?;
        if pad_added {
            println!("  Added {} token (id {})", PAD_TOKEN, pad_id);
        }
        let vocab_size = cfg.vocab_size.max(tokenizer.get_vocab_size(true));

        let mut tensors: HashMap<String, Tensor> = HashMap::new();
        for file in safetensor_files(base_model_dir)? {
            let loaded = candle_core::safetensors::load(&file, &self.device)?;
            tensors.extend(loaded);
        }
        let base_vb = VarBuilder::from_tensors(tensors, self.dtype, &self.device);

        // Adapters live in the varmap, in F32 regardless of base dtype
        let varmap = VarMap::new();
        let lora_vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);

        let mut model = Llama::load(base_vb, lora_vb, &cfg, vocab_size, &self.spec, self.quant)?;
        model.set_train(true);

        let eos_ids = cfg.eos_token_ids();
        let max_len = self.params.max_seq_len.min(cfg.max_position_embeddings);
        let rows = encode_texts(&tokenizer, texts, &eos_ids, max_len)?;
        if rows.is_empty() {
            return Err(CandleError::Config(
                "no trainable sequences after tokenization".to_string(),
            ));
        }
        let lengths: Vec<usize> = rows.iter().map(|r| r.len()).collect();

        let epochs = self.params.num_epochs.max(1);
        let batch_size = self.params.batch_size.max(1);
        let accum = self.params.gradient_accumulation_steps.max(1);
        let max_steps = self.params.max_steps.filter(|s| *s > 0);

        let batches_per_epoch = rows.len().div_ceil(batch_size);
        let mut total_steps = batches_per_epoch.div_ceil(accum) * epochs;
        if let Some(limit) = max_steps {
            total_steps = total_steps.min(limit);
        }
        let warmup_steps = ((total_steps as f64) * self.params.warmup_ratio).ceil() as usize;

        let vars = varmap.all_vars();
        let mut optimizer = AdamW::new(
            vars.clone(),
            ParamsAdamW {
                lr: self.params.learning_rate,
                weight_decay: self.params.weight_decay,
                ..Default::default()
            },
        )?;

        if let Some(previous) = latest_checkpoint(output_dir) {
            println!(
                "⚠️ Found existing checkpoint at {}, starting fresh",
                previous.display()
            );
        }
        println!(
            "🚀 Starting LoRA training: {} samples, {} steps planned",
            rows.len(),
            total_steps
        );

        // The rotary tables are position-indexed and read-only, one
        // cache serves every batch
        let mut cache = Cache::new(false, self.dtype, &cfg, &self.device)?;

        let mut global_step = 0usize;
        let mut final_loss = f32::NAN;

        'outer: for epoch in 0..epochs {
            println!("Epoch {}/{}", epoch + 1, epochs);
            let batches = build_batches(
                &lengths,
                batch_size,
                self.params.group_by_length,
                self.params.seed.wrapping_add(epoch as u64),
            );

            for step_batches in batches.chunks(accum) {
                let mut total: Option<Tensor> = None;
                for batch_indices in step_batches {
                    let selected: Vec<&[u32]> = batch_indices
                        .iter()
                        .map(|&i| rows[i].as_slice())
                        .collect();
                    let batch = collate(&selected, pad_id, &self.device)?;
                    let loss = self.batch_loss(&model, &batch, &mut cache)?;
                    let scaled = (loss / accum as f64)?;
                    total = Some(match total {
                        Some(t) => (t + scaled)?,
                        None => scaled,
                    });
                }
                let Some(total) = total else { continue };

                let mut grads = total.backward()?;
                clip_grad_norm(&vars, &mut grads, self.params.max_grad_norm)?;
                let lr = lr_at_step(self.params.learning_rate, global_step, warmup_steps);
                optimizer.set_learning_rate(lr);
                optimizer.step(&grads)?;

                global_step += 1;
                final_loss = total.to_scalar::<f32>()?;

                if self.params.logging_steps > 0 && global_step % self.params.logging_steps == 0 {
                    println!(
                        "  Step {}: loss={:.4}, lr={:.2e}",
                        global_step, final_loss, lr
                    );
                }
                if self.params.save_steps > 0 && global_step % self.params.save_steps == 0 {
                    let ckpt_dir = output_dir.join(format!("checkpoint-{}", global_step));
                    save_adapter(
                        &varmap,
                        &self.spec,
                        &ckpt_dir,
                        &base_model_dir.to_string_lossy(),
                    )?;
                    println!("💾 Saved checkpoint to {}", ckpt_dir.display());
                }
                if let Some(limit) = max_steps {
                    if global_step >= limit {
                        break 'outer;
                    }
                }
            }
        }

        model.set_train(false);
        println!(
            "✅ Training complete: {} steps, final loss {:.4}",
            global_step, final_loss
        );

        Ok(TrainOutcome {
            model,
            tokenizer,
            varmap,
            config: cfg,
            final_loss,
            steps: global_step,
            eos_ids,
        })
    }

    /// Cross-entropy over next-token targets, padding excluded
    fn batch_loss(
        &self,
        model: &Llama,
        batch: &Batch,
        cache: &mut Cache,
    ) -> Result<Tensor, CandleError> {
        let (b, t) = batch.inputs.dims2()?;
        let logits = model.forward(&batch.inputs, 0, cache, batch.mask.as_ref())?;
        let vocab = logits.dim(2)?;
        let logits = logits
            .narrow(1, 0, t - 1)?
            .reshape((b * (t - 1), vocab))?
            .to_dtype(DType::F32)?
            .index_select(&batch.keep, 0)?;
        Ok(candle_nn::loss::cross_entropy(&logits, &batch.targets)?)
    }
}

/// Register the padding token unless the tokenizer already has one
fn ensure_pad_token(tokenizer: &mut Tokenizer) -> Result<(u32, bool), CandleError> {
    if let Some(id) = tokenizer.token_to_id(PAD_TOKEN) {
        return Ok((id, false));
    }
    tokenizer.add_special_tokens(&[AddedToken::from(PAD_TOKEN, true)]);
    match tokenizer.token_to_id(PAD_TOKEN) {
        Some(id) => Ok((id, true)),
        None => Err(CandleError::Config(
            "failed to register padding token".to_string(),
        )),
    }
}

/// Tokenize, truncate and append the end of sequence token
///
/// Rows with fewer than two tokens carry no next-token target and are
/// dropped.
fn encode_texts(
    tokenizer: &Tokenizer,
    texts: &[String],
    eos_ids: &[u32],
    max_len: usize,
) -> Result<Vec<Vec<u32>>, CandleError> {
    let cap = max_len.saturating_sub(1).max(1);
    let mut rows = Vec::with_capacity(texts.len());
    for text in texts {
        let encoding = tokenizer.encode(text.as_str(), true)?;
        let mut ids: Vec<u32> = encoding.get_ids().to_vec();
        ids.truncate(cap);
        if let Some(eos) = eos_ids.first() {
            ids.push(*eos);
        }
        if ids.len() >= 2 {
            rows.push(ids);
        }
    }
    Ok(rows)
}

/// Order samples into micro-batches
///
/// With length grouping, samples sort by token count so each batch pads
/// minimally, and the batch order shuffles. Otherwise the samples
/// themselves shuffle.
pub(crate) fn build_batches(
    lengths: &[usize],
    batch_size: usize,
    group_by_length: bool,
    seed: u64,
) -> Vec<Vec<usize>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..lengths.len()).collect();
    let batch_size = batch_size.max(1);
    if group_by_length {
        indices.sort_by_key(|&i| lengths[i]);
        let mut batches: Vec<Vec<usize>> =
            indices.chunks(batch_size).map(|c| c.to_vec()).collect();
        batches.shuffle(&mut rng);
        batches
    } else {
        indices.shuffle(&mut rng);
        indices.chunks(batch_size).map(|c| c.to_vec()).collect()
    }
}

/// Right-pad rows to a rectangle and precompute target gathering
fn collate(rows: &[&[u32]], pad_id: u32, device: &Device) -> Result<Batch, CandleError> {
    if rows.is_empty() {
        return Err(CandleError::Config("empty batch".to_string()));
    }
    let b = rows.len();
    let t = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    if t < 2 {
        return Err(CandleError::Config(
            "batch rows too short to train on".to_string(),
        ));
    }

    let mut input_data = Vec::with_capacity(b * t);
    let mut pad_data = Vec::with_capacity(b * t);
    let mut targets = Vec::new();
    let mut keep = Vec::new();
    let mut any_pad = false;

    for (row_idx, row) in rows.iter().enumerate() {
        for pos in 0..t {
            if pos < row.len() {
                input_data.push(row[pos]);
                pad_data.push(0u8);
            } else {
                input_data.push(pad_id);
                pad_data.push(1u8);
                any_pad = true;
            }
        }
        // Padded positions never become targets
        for pos in 0..t - 1 {
            if pos + 1 < row.len() {
                targets.push(row[pos + 1]);
                keep.push((row_idx * (t - 1) + pos) as u32);
            }
        }
    }

    let inputs = Tensor::from_vec(input_data, (b, t), device)?;
    let n_targets = targets.len();
    let targets = Tensor::from_vec(targets, n_targets, device)?;
    let keep = Tensor::from_vec(keep, n_targets, device)?;
    let mask = if any_pad {
        Some(Tensor::from_vec(pad_data, (b, 1, 1, t), device)?)
    } else {
        None
    };

    Ok(Batch {
        inputs,
        targets,
        keep,
        mask,
    })
}

/// Linear warmup into a constant learning rate
pub(crate) fn lr_at_step(base_lr: f64, step: usize, warmup_steps: usize) -> f64 {
    if warmup_steps == 0 || step >= warmup_steps {
        base_lr
    } else {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    }
}

/// Scale gradients down when their global norm exceeds the threshold,
/// returning the norm before clipping
pub(crate) fn clip_grad_norm(
    vars: &[Var],
    grads: &mut GradStore,
    max_norm: f64,
) -> Result<f64, CandleError> {
    let mut total_sq = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var) {
            let sq = grad
                .sqr()?
                .sum_all()?
                .to_dtype(DType::F32)?
                .to_scalar::<f32>()?;
            total_sq += sq as f64;
        }
    }
    let norm = total_sq.sqrt();
    if max_norm > 0.0 && norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for var in vars {
            let clipped = match grads.get(var) {
                Some(grad) => (grad * scale)?,
                None => continue,
            };
            grads.insert(var, clipped);
        }
    }
    Ok(norm)
}

/// Write the adapter weights and PEFT config into a directory
pub(crate) fn save_adapter(
    varmap: &VarMap,
    spec: &LoraSpec,
    dir: &Path,
    base_model: &str,
) -> Result<(), CandleError> {
    std::fs::create_dir_all(dir)?;
    varmap.save(dir.join("adapter_model.safetensors"))?;
    let config = PeftConfig::from_spec(spec, base_model);
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| CandleError::Config(format!("failed to serialize adapter config: {}", e)))?;
    std::fs::write(dir.join("adapter_config.json"), json)?;
    Ok(())
}

/// Highest-numbered checkpoint directory under the output directory
pub(crate) fn latest_checkpoint(output_dir: &Path) -> Option<PathBuf> {
    let re = Regex::new(r"^checkpoint-(\d+)$").ok()?;
    let entries = std::fs::read_dir(output_dir).ok()?;
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(caps) = re.captures(name) else { continue };
        let Ok(step) = caps[1].parse::<u64>() else { continue };
        if best.as_ref().is_none_or(|(b, _)| step > *b) {
            best = Some((step, entry.path()));
        }
    }
    best.map(|(_, path)| path)
}

/// Every .safetensors file in the model directory, sorted by name
fn safetensor_files(dir: &Path) -> Result<Vec<PathBuf>, CandleError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "safetensors") {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(CandleError::Config(format!(
            "no safetensors files in {}",
            dir.display()
        )));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::Init;
    use tanren_core::ComputeDtype;
    use tokenizers::models::wordlevel::WordLevel;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tanren-trainer-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn word_level_tokenizer(words: &[&str]) -> Tokenizer {
        let mut vocab = HashMap::new();
        vocab.insert("<unk>".to_string(), 0u32);
        for (i, word) in words.iter().enumerate() {
            vocab.insert(word.to_string(), (i + 1) as u32);
        }
        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token("<unk>".to_string())
            .build()
            .unwrap();
        Tokenizer::new(model)
    }

    #[test]
    fn test_lr_warmup_schedule() {
        let base = 2e-4;
        assert!((lr_at_step(base, 0, 4) - base * 0.25).abs() < 1e-12);
        assert!((lr_at_step(base, 1, 4) - base * 0.5).abs() < 1e-12);
        assert!((lr_at_step(base, 3, 4) - base).abs() < 1e-12);
        assert!((lr_at_step(base, 100, 4) - base).abs() < 1e-12);
        assert!((lr_at_step(base, 0, 0) - base).abs() < 1e-12);
    }

    #[test]
    fn test_build_batches_groups_by_length() {
        let lengths = vec![5, 2, 9, 3, 7, 1];
        let batches = build_batches(&lengths, 2, true, 7);

        assert_eq!(batches.len(), 3);
        let mut seen: Vec<usize> = batches.iter().flatten().copied().collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);

        // Neighbours by length end up together, spread stays small
        for batch in &batches {
            let lens: Vec<usize> = batch.iter().map(|&i| lengths[i]).collect();
            let spread = lens.iter().max().unwrap() - lens.iter().min().unwrap();
            assert!(spread <= 2, "batch {:?} spread {}", lens, spread);
        }

        // Same seed, same batching
        assert_eq!(batches, build_batches(&lengths, 2, true, 7));
    }

    #[test]
    fn test_build_batches_covers_all_without_grouping() {
        let lengths = vec![4; 7];
        let batches = build_batches(&lengths, 3, false, 1);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].len(), 1);
        let mut seen: Vec<usize> = batches.iter().flatten().copied().collect();
        seen.sort();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_collate_pads_and_filters_targets() {
        let device = Device::Cpu;
        let rows: Vec<&[u32]> = vec![&[10, 11, 12], &[20, 21]];
        let batch = collate(&rows, 0, &device).unwrap();

        assert_eq!(batch.inputs.dims(), [2, 3]);
        assert_eq!(
            batch.inputs.flatten_all().unwrap().to_vec1::<u32>().unwrap(),
            vec![10, 11, 12, 20, 21, 0]
        );

        let mask = batch.mask.unwrap();
        assert_eq!(mask.dims(), [2, 1, 1, 3]);
        assert_eq!(
            mask.flatten_all().unwrap().to_vec1::<u8>().unwrap(),
            vec![0, 0, 0, 0, 0, 1]
        );

        assert_eq!(batch.targets.to_vec1::<u32>().unwrap(), vec![11, 12, 21]);
        assert_eq!(batch.keep.to_vec1::<u32>().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_collate_equal_lengths_needs_no_mask() {
        let device = Device::Cpu;
        let rows: Vec<&[u32]> = vec![&[1, 2], &[3, 4]];
        let batch = collate(&rows, 0, &device).unwrap();
        assert!(batch.mask.is_none());
    }

    #[test]
    fn test_ensure_pad_token_registers_once() {
        let mut tokenizer = word_level_tokenizer(&["hello", "world"]);
        assert!(tokenizer.token_to_id(PAD_TOKEN).is_none());

        let (pad_id, added) = ensure_pad_token(&mut tokenizer).unwrap();
        assert!(added);
        assert_eq!(pad_id, 3);

        let (again, added) = ensure_pad_token(&mut tokenizer).unwrap();
        assert!(!added);
        assert_eq!(again, pad_id);
    }

    #[test]
    fn test_encode_texts_appends_eos() {
        let tokenizer = word_level_tokenizer(&["hello", "world", "</s>"]);
        let texts = vec!["hello".to_string(), "world".to_string()];
        let rows = encode_texts(&tokenizer, &texts, &[3], 16).unwrap();

        assert_eq!(rows, vec![vec![1, 3], vec![2, 3]]);
    }

    #[test]
    fn test_encode_texts_drops_rows_without_targets() {
        // A single token and no end of sequence id leaves nothing to
        // predict
        let tokenizer = word_level_tokenizer(&["hello"]);
        let rows = encode_texts(&tokenizer, &["hello".to_string()], &[], 16).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_clip_grad_norm_scales_to_threshold() {
        let device = Device::Cpu;
        let var =
            Var::from_tensor(&Tensor::new(&[3f32, 4.0], &device).unwrap()).unwrap();
        let loss = (var.as_tensor() * 2.0).unwrap().sum_all().unwrap();
        let vars = vec![var];

        // d(2x)/dx is 2 per element, norm sqrt(8)
        let mut grads = loss.backward().unwrap();
        let norm = clip_grad_norm(&vars, &mut grads, 1.0).unwrap();
        assert!((norm - 8f64.sqrt()).abs() < 1e-4);

        let after = clip_grad_norm(&vars, &mut grads, 1.0).unwrap();
        assert!((after - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_clip_grad_norm_leaves_small_gradients() {
        let device = Device::Cpu;
        let var =
            Var::from_tensor(&Tensor::new(&[0.1f32, 0.1], &device).unwrap()).unwrap();
        let loss = (var.as_tensor() * 1.0).unwrap().sum_all().unwrap();
        let vars = vec![var];

        let mut grads = loss.backward().unwrap();
        let norm = clip_grad_norm(&vars, &mut grads, 10.0).unwrap();
        assert!((norm - 2f64.sqrt()).abs() < 1e-4);

        let after = clip_grad_norm(&vars, &mut grads, 10.0).unwrap();
        assert!((after - norm).abs() < 1e-6);
    }

    #[test]
    fn test_save_adapter_writes_weights_and_config() {
        let dir = scratch_dir("save-adapter");
        let device = Device::Cpu;
        let varmap = VarMap::new();
        varmap
            .get(
                (4, 8),
                "model.layers.0.self_attn.q_proj.lora_A.weight",
                Init::Const(0.5),
                DType::F32,
                &device,
            )
            .unwrap();

        let spec = LoraSpec::llama_default();
        save_adapter(&varmap, &spec, &dir, "models/base").unwrap();

        assert!(dir.join("adapter_model.safetensors").exists());
        let config: PeftConfig = serde_json::from_str(
            &std::fs::read_to_string(dir.join("adapter_config.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(config.r, 64);
        assert_eq!(config.peft_type, "LORA");
        assert_eq!(config.base_model_name_or_path, "models/base");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_latest_checkpoint_picks_highest_step() {
        let dir = scratch_dir("latest-ckpt");
        std::fs::create_dir_all(dir.join("checkpoint-50")).unwrap();
        std::fs::create_dir_all(dir.join("checkpoint-100")).unwrap();
        std::fs::create_dir_all(dir.join("notes")).unwrap();

        let latest = latest_checkpoint(&dir).unwrap();
        assert!(latest.ends_with("checkpoint-100"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_latest_checkpoint_empty_dir() {
        let dir = scratch_dir("no-ckpt");
        assert!(latest_checkpoint(&dir).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tiny_model_dir() -> PathBuf {
        let dir = scratch_dir("tiny-model");
        let device = Device::Cpu;

        let cfg = LlamaConfig {
            hidden_size: 32,
            intermediate_size: 64,
            vocab_size: 32,
            num_hidden_layers: 2,
            num_attention_heads: 4,
            num_key_value_heads: Some(2),
            rms_norm_eps: 1e-5,
            rope_theta: 10_000.0,
            rope_scaling: None,
            max_position_embeddings: 32,
            tie_word_embeddings: false,
            eos_token_id: Some(crate::llama::EosTokenId::Single(3)),
        };

        let config_json = serde_json::json!({
            "hidden_size": 32,
            "intermediate_size": 64,
            "vocab_size": 32,
            "num_hidden_layers": 2,
            "num_attention_heads": 4,
            "num_key_value_heads": 2,
            "rms_norm_eps": 1e-5,
            "rope_theta": 10000.0,
            "max_position_embeddings": 32,
            "tie_word_embeddings": false,
            "eos_token_id": 3
        });
        std::fs::write(dir.join("config.json"), config_json.to_string()).unwrap();

        let tokenizer = word_level_tokenizer(&["hello", "world", "</s>"]);
        tokenizer.save(dir.join("tokenizer.json"), false).unwrap();

        let h = cfg.hidden_size;
        let i = cfg.intermediate_size;
        let kv = cfg.head_size() * cfg.num_kv_heads();
        let randn = |shape: (usize, usize)| Tensor::randn(0f32, 0.02, shape, &device).unwrap();
        let ones = |n: usize| Tensor::ones(n, DType::F32, &device).unwrap();

        let mut ws = HashMap::new();
        ws.insert(
            "model.embed_tokens.weight".to_string(),
            randn((cfg.vocab_size, h)),
        );
        for l in 0..cfg.num_hidden_layers {
            let p = format!("model.layers.{}", l);
            ws.insert(format!("{}.input_layernorm.weight", p), ones(h));
            ws.insert(format!("{}.post_attention_layernorm.weight", p), ones(h));
            ws.insert(format!("{}.self_attn.q_proj.weight", p), randn((h, h)));
            ws.insert(format!("{}.self_attn.k_proj.weight", p), randn((kv, h)));
            ws.insert(format!("{}.self_attn.v_proj.weight", p), randn((kv, h)));
            ws.insert(format!("{}.self_attn.o_proj.weight", p), randn((h, h)));
            ws.insert(format!("{}.mlp.gate_proj.weight", p), randn((i, h)));
            ws.insert(format!("{}.mlp.up_proj.weight", p), randn((i, h)));
            ws.insert(format!("{}.mlp.down_proj.weight", p), randn((h, i)));
        }
        ws.insert("model.norm.weight".to_string(), ones(h));
        ws.insert("lm_head.weight".to_string(), randn((cfg.vocab_size, h)));
        candle_core::safetensors::save(&ws, dir.join("model.safetensors")).unwrap();

        dir
    }

    #[test]
    fn test_train_tiny_model_end_to_end() {
        let model_dir = tiny_model_dir();
        let out_dir = scratch_dir("train-out");

        let params = TrainParams {
            num_epochs: 1,
            batch_size: 2,
            learning_rate: 1e-3,
            save_steps: 1,
            logging_steps: 1,
            max_seq_len: 16,
            compute_dtype: ComputeDtype::F32,
            ..TrainParams::default()
        };
        let spec = LoraSpec {
            rank: 2,
            alpha: 4.0,
            dropout: 0.0,
            ..LoraSpec::llama_default()
        };
        let trainer = SftTrainer::new(params, spec, QuantMode::None, Device::Cpu, DType::F32);

        let texts = vec![
            "hello".to_string(),
            "world".to_string(),
            "hello".to_string(),
            "world".to_string(),
        ];
        let outcome = trainer.train(&model_dir, &texts, &out_dir).unwrap();

        assert_eq!(outcome.steps, 2);
        assert!(outcome.final_loss.is_finite());
        assert_eq!(outcome.eos_ids, vec![3]);
        // 2 layers, 7 targets, A and B per adapter
        assert_eq!(outcome.varmap.all_vars().len(), 28);

        assert!(out_dir.join("checkpoint-1/adapter_model.safetensors").exists());
        assert!(out_dir.join("checkpoint-2/adapter_config.json").exists());
        let latest = latest_checkpoint(&out_dir).unwrap();
        assert!(latest.ends_with("checkpoint-2"));

        std::fs::remove_dir_all(&model_dir).ok();
        std::fs::remove_dir_all(&out_dir).ok();
    }
}
