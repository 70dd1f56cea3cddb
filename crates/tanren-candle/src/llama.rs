//! Llama model with LoRA adapters on the projection layers
//!
//! Based on candle's Llama implementation. Base weights load frozen
//! (optionally 4-bit quantized) while adapters register in a `VarMap`
//! for training. All forward ops stay on the differentiable path so
//! gradients reach the adapters.

use std::f32::consts::PI;
use std::path::Path;

use candle_core::{D, DType, Device, IndexOp, Result as CandleResult, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};
use serde::Deserialize;
use tanren_core::QuantMode;

use crate::error::CandleError;
use crate::lora::{DynLinear, LinearLayer, LoraProj, LoraSpec};

fn default_rope_theta() -> f32 {
    10_000.0
}

fn default_max_position_embeddings() -> usize {
    4096
}

/// Llama specific RoPE scaling type
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RopeType {
    Llama3,
    #[serde(other)]
    #[default]
    Default,
}

/// RoPE frequency scaling, present in Llama 3.1+ configs
#[derive(Debug, Clone, Deserialize)]
pub struct RopeScaling {
    pub factor: f32,
    pub low_freq_factor: f32,
    pub high_freq_factor: f32,
    pub original_max_position_embeddings: usize,
    #[serde(default)]
    pub rope_type: RopeType,
}

/// End of sequence token, a single id or a list of ids
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum EosTokenId {
    Single(u32),
    Multiple(Vec<u32>),
}

/// Model configuration, deserialized from config.json
#[derive(Debug, Clone, Deserialize)]
pub struct LlamaConfig {
    pub hidden_size: usize,
    pub intermediate_size: usize,
    pub vocab_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub num_key_value_heads: Option<usize>,
    pub rms_norm_eps: f64,
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f32,
    pub rope_scaling: Option<RopeScaling>,
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub tie_word_embeddings: bool,
    pub eos_token_id: Option<EosTokenId>,
}

impl LlamaConfig {
    /// Load from a model directory containing config.json
    pub fn from_dir(dir: &Path) -> Result<Self, CandleError> {
        let path = dir.join("config.json");
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| CandleError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn head_size(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    pub fn num_kv_heads(&self) -> usize {
        self.num_key_value_heads
            .unwrap_or(self.num_attention_heads)
    }

    /// All ids that terminate generation
    pub fn eos_token_ids(&self) -> Vec<u32> {
        match &self.eos_token_id {
            Some(EosTokenId::Single(id)) => vec![*id],
            Some(EosTokenId::Multiple(ids)) => ids.clone(),
            None => vec![],
        }
    }
}

/// Cache for KV tensors and rotary embedding tables
#[derive(Debug, Clone)]
pub struct Cache {
    pub use_kv_cache: bool,
    kvs: Vec<Option<(Tensor, Tensor)>>,
    cos: Tensor,
    sin: Tensor,
}

fn calculate_default_inv_freq(config: &LlamaConfig) -> Vec<f32> {
    let head_dim = config.head_size();
    (0..head_dim)
        .step_by(2)
        .map(|i| 1f32 / config.rope_theta.powf(i as f32 / head_dim as f32))
        .collect()
}

impl Cache {
    pub fn new(
        use_kv_cache: bool,
        dtype: DType,
        config: &LlamaConfig,
        device: &Device,
    ) -> Result<Self, CandleError> {
        // Frequencies, with Llama3 scaling when the config carries it
        let theta = match &config.rope_scaling {
            None
            | Some(RopeScaling {
                rope_type: RopeType::Default,
                ..
            }) => calculate_default_inv_freq(config),
            Some(rope_scaling) => {
                let low_freq_wavelen = rope_scaling.original_max_position_embeddings as f32
                    / rope_scaling.low_freq_factor;
                let high_freq_wavelen = rope_scaling.original_max_position_embeddings as f32
                    / rope_scaling.high_freq_factor;

                calculate_default_inv_freq(config)
                    .into_iter()
                    .map(|freq| {
                        let wavelen = 2.0 * PI / freq;
                        if wavelen < high_freq_wavelen {
                            freq
                        } else if wavelen > low_freq_wavelen {
                            freq / rope_scaling.factor
                        } else {
                            let smooth = (rope_scaling.original_max_position_embeddings as f32
                                / wavelen
                                - rope_scaling.low_freq_factor)
                                / (rope_scaling.high_freq_factor - rope_scaling.low_freq_factor);
                            freq / (1.0 - smooth + smooth * rope_scaling.factor)
                        }
                    })
                    .collect()
            }
        };

        let theta = Tensor::new(theta.as_slice(), device)?;
        let idx_theta = Tensor::arange(0, config.max_position_embeddings as u32, device)?
            .to_dtype(DType::F32)?
            .reshape((config.max_position_embeddings, 1))?
            .matmul(&theta.reshape((1, theta.elem_count()))?)?;

        let cos = idx_theta.cos()?.to_dtype(dtype)?;
        let sin = idx_theta.sin()?.to_dtype(dtype)?;

        Ok(Self {
            use_kv_cache,
            kvs: vec![None; config.num_hidden_layers],
            cos,
            sin,
        })
    }

    /// Drop cached KV tensors, keeping the rotary tables
    pub fn reset(&mut self) {
        for kv in self.kvs.iter_mut() {
            *kv = None;
        }
    }
}

/// Rotate the second half of the last dimension in front of the first
fn rotate_half(x: &Tensor) -> CandleResult<Tensor> {
    let last_dim = x.dim(D::Minus1)?;
    let x1 = x.narrow(D::Minus1, 0, last_dim / 2)?;
    let x2 = x.narrow(D::Minus1, last_dim / 2, last_dim - last_dim / 2)?;
    Tensor::cat(&[&x2.neg()?, &x1], D::Minus1)
}

/// Rotary embedding with the rotate-half convention
///
/// Built from plain tensor ops rather than the fused rope kernel so the
/// backward pass reaches the query and key adapters.
fn apply_rotary_emb(x: &Tensor, index_pos: usize, cache: &Cache) -> CandleResult<Tensor> {
    let (_b_sz, _n_head, seq_len, _head_dim) = x.dims4()?;
    let cos = cache.cos.narrow(0, index_pos, seq_len)?;
    let sin = cache.sin.narrow(0, index_pos, seq_len)?;
    let cos = Tensor::cat(&[&cos, &cos], D::Minus1)?;
    let sin = Tensor::cat(&[&sin, &sin], D::Minus1)?;
    let rotated = rotate_half(x)?;
    x.broadcast_mul(&cos)? + rotated.broadcast_mul(&sin)?
}

/// Masked fill operation
fn masked_fill(on_false: &Tensor, mask: &Tensor, on_true: f32) -> CandleResult<Tensor> {
    let shape = mask.shape();
    let on_true = Tensor::new(on_true, on_false.device())?.broadcast_as(shape.dims())?;
    let m = mask.where_cond(&on_true, on_false)?;
    Ok(m)
}

/// Causal self-attention with LoRA-adapted projections
struct CausalSelfAttention {
    q_proj: LoraProj,
    k_proj: LoraProj,
    v_proj: LoraProj,
    o_proj: LoraProj,
    num_attention_heads: usize,
    num_key_value_heads: usize,
    head_dim: usize,
    max_position_embeddings: usize,
}

impl CausalSelfAttention {
    fn load(
        base_vb: VarBuilder,
        lora_vb: VarBuilder,
        cfg: &LlamaConfig,
        spec: &LoraSpec,
        quant: QuantMode,
    ) -> Result<Self, CandleError> {
        let size_in = cfg.hidden_size;
        let size_q = cfg.head_size() * cfg.num_attention_heads;
        let size_kv = cfg.head_size() * cfg.num_kv_heads();

        let q_proj = LoraProj::load(size_in, size_q, "q_proj", &base_vb, &lora_vb, spec, quant)?;
        let k_proj = LoraProj::load(size_in, size_kv, "k_proj", &base_vb, &lora_vb, spec, quant)?;
        let v_proj = LoraProj::load(size_in, size_kv, "v_proj", &base_vb, &lora_vb, spec, quant)?;
        let o_proj = LoraProj::load(size_q, size_in, "o_proj", &base_vb, &lora_vb, spec, quant)?;

        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            o_proj,
            num_attention_heads: cfg.num_attention_heads,
            num_key_value_heads: cfg.num_kv_heads(),
            head_dim: cfg.head_size(),
            max_position_embeddings: cfg.max_position_embeddings,
        })
    }

    fn set_train(&mut self, train: bool) {
        self.q_proj.set_train(train);
        self.k_proj.set_train(train);
        self.v_proj.set_train(train);
        self.o_proj.set_train(train);
    }

    fn forward(
        &self,
        x: &Tensor,
        index_pos: usize,
        block_idx: usize,
        cache: &mut Cache,
        attn_mask: Option<&Tensor>,
    ) -> Result<Tensor, CandleError> {
        let (b_sz, seq_len, hidden_size) = x.dims3()?;
        let q = self.q_proj.forward(x)?;
        let k = self.k_proj.forward(x)?;
        let v = self.v_proj.forward(x)?;

        let q = q
            .reshape((b_sz, seq_len, self.num_attention_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = k
            .reshape((b_sz, seq_len, self.num_key_value_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let mut v = v
            .reshape((b_sz, seq_len, self.num_key_value_heads, self.head_dim))?
            .transpose(1, 2)?;

        // Apply rotary embeddings
        let q = apply_rotary_emb(&q, index_pos, cache)?;
        let mut k = apply_rotary_emb(&k, index_pos, cache)?;

        // KV cache handling
        if cache.use_kv_cache {
            if let Some((cache_k, cache_v)) = &cache.kvs[block_idx] {
                k = Tensor::cat(&[cache_k, &k], 2)?.contiguous()?;
                v = Tensor::cat(&[cache_v, &v], 2)?.contiguous()?;
                let k_seq_len = k.dims()[2];
                if k_seq_len > self.max_position_embeddings {
                    k = k
                        .narrow(
                            2,
                            k_seq_len - self.max_position_embeddings,
                            self.max_position_embeddings,
                        )?
                        .contiguous()?;
                }
                let v_seq_len = v.dims()[2];
                if v_seq_len > self.max_position_embeddings {
                    v = v
                        .narrow(
                            2,
                            v_seq_len - self.max_position_embeddings,
                            self.max_position_embeddings,
                        )?
                        .contiguous()?;
                }
            }
            cache.kvs[block_idx] = Some((k.clone(), v.clone()));
        }

        // Repeat KV heads for grouped-query attention
        let k = self.repeat_kv(k)?;
        let v = self.repeat_kv(v)?;

        // Attention in F32 for numerical stability
        let in_dtype = q.dtype();
        let q = q.to_dtype(DType::F32)?;
        let k = k.to_dtype(DType::F32)?;
        let v = v.to_dtype(DType::F32)?;

        let att = (q.matmul(&k.t()?)? / (self.head_dim as f64).sqrt())?;

        let att = if seq_len == 1 {
            att
        } else {
            let causal = self.causal_mask(seq_len, x.device())?;
            let mask = match attn_mask {
                // Combined with the padding mask, nonzero means masked
                Some(pad) => pad.broadcast_add(&causal)?,
                None => causal,
            };
            let mask = mask.broadcast_as(att.shape())?;
            masked_fill(&att, &mask, f32::NEG_INFINITY)?
        };

        let att = candle_nn::ops::softmax(&att, D::Minus1)?;
        let att_output = att.matmul(&v.contiguous()?)?.to_dtype(in_dtype)?;

        let y = att_output
            .transpose(1, 2)?
            .reshape((b_sz, seq_len, hidden_size))?;
        self.o_proj.forward(&y).map_err(CandleError::from)
    }

    fn repeat_kv(&self, x: Tensor) -> Result<Tensor, CandleError> {
        let n_rep = self.num_attention_heads / self.num_key_value_heads;
        if n_rep == 1 {
            Ok(x)
        } else {
            let (b_sz, n_kv_head, seq_len, head_dim) = x.dims4()?;
            let x = x
                .unsqueeze(2)?
                .expand((b_sz, n_kv_head, n_rep, seq_len, head_dim))?
                .reshape((b_sz, n_kv_head * n_rep, seq_len, head_dim))?;
            Ok(x)
        }
    }

    fn causal_mask(&self, seq_len: usize, device: &Device) -> Result<Tensor, CandleError> {
        let mask: Vec<_> = (0..seq_len)
            .flat_map(|i| (0..seq_len).map(move |j| u8::from(j > i)))
            .collect();
        Ok(Tensor::from_slice(&mask, (seq_len, seq_len), device)?)
    }
}

/// MLP layer with LoRA-adapted projections
struct Mlp {
    gate_proj: LoraProj,
    up_proj: LoraProj,
    down_proj: LoraProj,
}

impl Mlp {
    fn load(
        base_vb: VarBuilder,
        lora_vb: VarBuilder,
        cfg: &LlamaConfig,
        spec: &LoraSpec,
        quant: QuantMode,
    ) -> Result<Self, CandleError> {
        let h_size = cfg.hidden_size;
        let i_size = cfg.intermediate_size;
        let gate_proj =
            LoraProj::load(h_size, i_size, "gate_proj", &base_vb, &lora_vb, spec, quant)?;
        let up_proj = LoraProj::load(h_size, i_size, "up_proj", &base_vb, &lora_vb, spec, quant)?;
        let down_proj =
            LoraProj::load(i_size, h_size, "down_proj", &base_vb, &lora_vb, spec, quant)?;
        Ok(Self {
            gate_proj,
            up_proj,
            down_proj,
        })
    }

    fn set_train(&mut self, train: bool) {
        self.gate_proj.set_train(train);
        self.up_proj.set_train(train);
        self.down_proj.set_train(train);
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor, CandleError> {
        let x = (candle_nn::ops::silu(&self.gate_proj.forward(x)?)? * self.up_proj.forward(x)?)?;
        self.down_proj.forward(&x).map_err(CandleError::from)
    }
}

/// Transformer block
struct Block {
    rms_1: candle_nn::RmsNorm,
    attn: CausalSelfAttention,
    rms_2: candle_nn::RmsNorm,
    mlp: Mlp,
}

impl Block {
    fn load(
        base_vb: VarBuilder,
        lora_vb: VarBuilder,
        cfg: &LlamaConfig,
        spec: &LoraSpec,
        quant: QuantMode,
    ) -> Result<Self, CandleError> {
        use candle_nn::rms_norm;

        let rms_1 = rms_norm(
            cfg.hidden_size,
            cfg.rms_norm_eps,
            base_vb.pp("input_layernorm"),
        )?;
        let rms_2 = rms_norm(
            cfg.hidden_size,
            cfg.rms_norm_eps,
            base_vb.pp("post_attention_layernorm"),
        )?;
        let attn = CausalSelfAttention::load(
            base_vb.pp("self_attn"),
            lora_vb.pp("self_attn"),
            cfg,
            spec,
            quant,
        )?;
        let mlp = Mlp::load(base_vb.pp("mlp"), lora_vb.pp("mlp"), cfg, spec, quant)?;

        Ok(Self {
            rms_1,
            attn,
            rms_2,
            mlp,
        })
    }

    fn set_train(&mut self, train: bool) {
        self.attn.set_train(train);
        self.mlp.set_train(train);
    }

    fn forward(
        &self,
        x: &Tensor,
        index_pos: usize,
        block_idx: usize,
        cache: &mut Cache,
        attn_mask: Option<&Tensor>,
    ) -> Result<Tensor, CandleError> {
        // forward_diff keeps the norm on the differentiable path
        let residual = x;
        let x = self.rms_1.forward_diff(x)?;
        let x = (self
            .attn
            .forward(&x, index_pos, block_idx, cache, attn_mask)?
            + residual)?;
        let residual = &x;
        let x = (self.mlp.forward(&self.rms_2.forward_diff(&x)?)? + residual)?;
        Ok(x)
    }
}

/// Load embeddings, padding extra vocabulary rows with zeros
fn load_embeddings(
    base_vb: &VarBuilder,
    cfg: &LlamaConfig,
    vocab_size: usize,
) -> Result<Embedding, CandleError> {
    let weight = base_vb.get((cfg.vocab_size, cfg.hidden_size), "model.embed_tokens.weight")?;
    let weight = if vocab_size > cfg.vocab_size {
        let extra = Tensor::zeros(
            (vocab_size - cfg.vocab_size, cfg.hidden_size),
            weight.dtype(),
            weight.device(),
        )?;
        Tensor::cat(&[&weight, &extra], 0)?
    } else {
        weight
    };
    Ok(Embedding::new(weight, cfg.hidden_size))
}

/// Llama model with LoRA adapters
pub struct Llama {
    wte: Embedding,
    blocks: Vec<Block>,
    ln_f: candle_nn::RmsNorm,
    lm_head: DynLinear,
    vocab_size: usize,
}

impl Llama {
    /// Load the model
    ///
    /// `base_vb` holds the frozen checkpoint weights, `lora_vb` must be
    /// backed by a `VarMap` so the adapters become trainable variables.
    /// `vocab_size` may exceed the checkpoint's vocabulary when the
    /// tokenizer gained a padding token, the extra rows start at zero.
    pub fn load(
        base_vb: VarBuilder,
        lora_vb: VarBuilder,
        cfg: &LlamaConfig,
        vocab_size: usize,
        spec: &LoraSpec,
        quant: QuantMode,
    ) -> Result<Self, CandleError> {
        println!("🔨 Loading Llama model...");

        let wte = load_embeddings(&base_vb, cfg, vocab_size)?;

        let mut blocks = Vec::with_capacity(cfg.num_hidden_layers);
        for idx in 0..cfg.num_hidden_layers {
            println!("  Loading block {}/{}", idx + 1, cfg.num_hidden_layers);
            let block = Block::load(
                base_vb.pp(format!("model.layers.{}", idx)),
                lora_vb.pp(format!("model.layers.{}", idx)),
                cfg,
                spec,
                quant,
            )?;
            blocks.push(block);
        }

        let ln_f = candle_nn::rms_norm(cfg.hidden_size, cfg.rms_norm_eps, base_vb.pp("model.norm"))?;

        // The head follows the embedding when weights are tied
        let lm_head: DynLinear = if cfg.tie_word_embeddings {
            Box::new(Linear::new(wte.embeddings().clone(), None))
        } else {
            let weight = base_vb.get((cfg.vocab_size, cfg.hidden_size), "lm_head.weight")?;
            let weight = if vocab_size > cfg.vocab_size {
                let extra = Tensor::zeros(
                    (vocab_size - cfg.vocab_size, cfg.hidden_size),
                    weight.dtype(),
                    weight.device(),
                )?;
                Tensor::cat(&[&weight, &extra], 0)?
            } else {
                weight
            };
            Box::new(Linear::new(weight, None))
        };

        println!("✅ Model loaded successfully");

        Ok(Self {
            wte,
            blocks,
            ln_f,
            lm_head,
            vocab_size,
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Switch adapter dropout on or off
    pub fn set_train(&mut self, train: bool) {
        for block in self.blocks.iter_mut() {
            block.set_train(train);
        }
    }

    /// Forward pass returning logits of shape (batch, seq, vocab)
    ///
    /// `attn_mask` is an optional padding mask of shape (batch, 1, 1,
    /// seq) with nonzero entries at padded key positions.
    pub fn forward(
        &self,
        input_ids: &Tensor,
        index_pos: usize,
        cache: &mut Cache,
        attn_mask: Option<&Tensor>,
    ) -> Result<Tensor, CandleError> {
        let (_b_sz, _seq_len) = input_ids.dims2()?;

        let mut x = self.wte.forward(input_ids)?;

        for (block_idx, block) in self.blocks.iter().enumerate() {
            x = block.forward(&x, index_pos, block_idx, cache, attn_mask)?;
        }

        let x = self.ln_f.forward_diff(&x)?;
        let logits = self.lm_head.forward(&x)?;

        Ok(logits)
    }

    /// Logits for the last position only, used during generation
    pub fn next_token_logits(
        &self,
        input_ids: &Tensor,
        index_pos: usize,
        cache: &mut Cache,
    ) -> Result<Tensor, CandleError> {
        let logits = self.forward(input_ids, index_pos, cache, None)?;
        let last = logits.dim(1)? - 1;
        Ok(logits.i((0, last))?)
    }
}
