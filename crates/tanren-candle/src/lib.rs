//! Candle training engine for tanren
//!
//! Implements LoRA finetuning of Llama-family models on the candle
//! tensor stack: frozen (optionally 4-bit quantized) base weights,
//! trainable low-rank adapters, an SFT training loop, and PEFT
//! compatible adapter persistence.

pub mod error;
pub mod llama;
pub mod lora;
pub mod quant;
pub mod trainer;
pub mod tuner;

pub use error::CandleError;
pub use llama::{Cache, EosTokenId, Llama, LlamaConfig, RopeScaling, RopeType};
pub use lora::{DynLinear, LinearLayer, LoraAdapter, LoraProj, LoraSpec, PeftConfig};
pub use quant::QuantLinear;
pub use trainer::{SftTrainer, TrainOutcome};
pub use tuner::CandleLoraTuner;
