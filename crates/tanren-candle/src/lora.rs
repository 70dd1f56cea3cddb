//! LoRA (Low-Rank Adaptation) layers for Candle models
//!
//! Trainable low-rank adapters paired with frozen base projections. The
//! adapter weights live in a `VarMap` so the optimizer can update them
//! while the base weights stay untouched. Includes PEFT
//! (Parameter-Efficient Fine-Tuning) adapter_config.json compatibility.

use candle_core::{Module, Result as CandleResult, Tensor};
use candle_nn::{Init, Linear, VarBuilder};
use serde::{Deserialize, Serialize};
use tanren_core::{LoraParams, QuantMode};

use crate::quant::QuantLinear;

/// LoRA adapter configuration
#[derive(Debug, Clone)]
pub struct LoraSpec {
    /// Rank of the LoRA adaptation
    pub rank: usize,
    /// Alpha, scale is alpha / rank
    pub alpha: f32,
    /// Dropout on the adapter input during training
    pub dropout: f32,
    /// Target modules to apply LoRA
    pub target_modules: Vec<String>,
}

impl Default for LoraSpec {
    fn default() -> Self {
        Self::llama_default()
    }
}

impl LoraSpec {
    /// Configuration with the full set of Llama-style target modules
    pub fn llama_default() -> Self {
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

    /// Whether a module name is adapted
    pub fn is_target(&self, name: &str) -> bool {
        self.target_modules.iter().any(|target| target == name)
    }

    /// Scaling factor applied to the adapter output
    pub fn scale(&self) -> f64 {
        self.alpha as f64 / self.rank as f64
    }
}

impl From<&LoraParams> for LoraSpec {
    fn from(params: &LoraParams) -> Self {
        Self {
            rank: params.rank,
            alpha: params.alpha,
            dropout: params.dropout,
            target_modules: params.target_modules.clone(),
        }
    }
}

/// Linear-like layer used at every projection site
pub trait LinearLayer: Send + Sync {
    fn forward(&self, x: &Tensor) -> CandleResult<Tensor>;
}

impl LinearLayer for Linear {
    fn forward(&self, x: &Tensor) -> CandleResult<Tensor> {
        Module::forward(self, x)
    }
}

/// Boxed linear layer, either full precision or quantized
pub type DynLinear = Box<dyn LinearLayer>;

/// Trainable low-rank adapter for one projection
///
/// Follows the PEFT orientation: A is (rank, in_features) initialized
/// from a normal distribution, B is (out_features, rank) initialized to
/// zero so a fresh adapter leaves the base output unchanged.
pub struct LoraAdapter {
    lora_a: Tensor,
    lora_b: Tensor,
    scale: f64,
    dropout: f32,
}

impl LoraAdapter {
    /// Create adapter weights under `vb`, registering them for training
    pub fn new(
        vb: VarBuilder,
        in_features: usize,
        out_features: usize,
        spec: &LoraSpec,
    ) -> CandleResult<Self> {
        let init_a = Init::Randn {
            mean: 0.0,
            stdev: 0.02,
        };
        let lora_a = vb.get_with_hints((spec.rank, in_features), "lora_A.weight", init_a)?;
        let lora_b = vb.get_with_hints((out_features, spec.rank), "lora_B.weight", Init::Const(0.0))?;

        Ok(Self {
            lora_a,
            lora_b,
            scale: spec.scale(),
            dropout: spec.dropout,
        })
    }

    /// Adapter delta: dropout(x) @ A^T @ B^T * scale
    fn forward(&self, x: &Tensor, train: bool) -> CandleResult<Tensor> {
        let x = x.to_dtype(self.lora_a.dtype())?;
        let x = if train && self.dropout > 0.0 {
            candle_nn::ops::dropout(&x, self.dropout)?
        } else {
            x
        };
        x.broadcast_matmul(&self.lora_a.t()?)?
            .broadcast_matmul(&self.lora_b.t()?)?
            .affine(self.scale, 0.0)
    }
}

/// Projection combining a frozen base with an optional trainable adapter
pub struct LoraProj {
    base: DynLinear,
    adapter: Option<LoraAdapter>,
    train: bool,
}

impl LoraProj {
    pub fn new(base: DynLinear, adapter: Option<LoraAdapter>) -> Self {
        Self {
            base,
            adapter,
            train: false,
        }
    }

    /// Build a projection from a named base weight
    ///
    /// The base weight is quantized in 4-bit mode, and an adapter is
    /// attached when the module name is in the `LoraSpec` target list.
    pub fn load(
        in_features: usize,
        out_features: usize,
        name: &str,
        base_vb: &VarBuilder,
        lora_vb: &VarBuilder,
        spec: &LoraSpec,
        quant: QuantMode,
    ) -> CandleResult<Self> {
        let weight = base_vb.get((out_features, in_features), &format!("{}.weight", name))?;

        let base: DynLinear = match quant {
            QuantMode::FourBit => Box::new(
                QuantLinear::quantize(&weight)
                    .map_err(|e| candle_core::Error::Msg(format!("{}: {}", name, e)))?,
            ),
            QuantMode::None => Box::new(Linear::new(weight, None)),
        };

        let adapter = if spec.is_target(name) {
            Some(LoraAdapter::new(
                lora_vb.pp(name),
                in_features,
                out_features,
                spec,
            )?)
        } else {
            None
        };

        Ok(Self::new(base, adapter))
    }

    pub fn set_train(&mut self, train: bool) {
        self.train = train;
    }

    pub fn forward(&self, x: &Tensor) -> CandleResult<Tensor> {
        let y = self.base.forward(x)?;
        match &self.adapter {
            Some(adapter) => {
                let delta = adapter.forward(x, self.train)?.to_dtype(y.dtype())?;
                y + delta
            }
            None => Ok(y),
        }
    }
}

/// PEFT adapter_config.json structure
#[derive(Debug, Serialize, Deserialize)]
pub struct PeftConfig {
    pub r: usize,
    pub lora_alpha: f32,
    #[serde(default)]
    pub lora_dropout: f32,
    pub target_modules: Vec<String>,
    pub peft_type: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub base_model_name_or_path: String,
}

impl PeftConfig {
    /// Describe a trained adapter for adapter_config.json
    pub fn from_spec(spec: &LoraSpec, base_model: &str) -> Self {
        Self {
            r: spec.rank,
            lora_alpha: spec.alpha,
            lora_dropout: spec.dropout,
            target_modules: spec.target_modules.clone(),
            peft_type: "LORA".to_string(),
            task_type: "CAUSAL_LM".to_string(),
            base_model_name_or_path: base_model.to_string(),
        }
    }
}
