//! Main crate for the Tanren finetuning pipeline
//!
//! This is the application layer that wires base models, instruction
//! datasets, adapters and the training engine into a single pipeline.

pub mod base_model;
pub mod config;
pub mod dataset;
pub mod error;
pub mod lora;
pub mod pipeline;
pub mod storage;

// Re-export core types
pub use tanren_core::{
    ComputeDtype, CoreError, InstructionSample, LoraParams, QuantMode, Result, RunId, SharedTuner,
    TrainJob, TrainParams, TrainReport, Tuner, TunerExt, TunerMetadata,
};

// Re-export pipeline types
pub use pipeline::{FinetunePipeline, FinetunePipelineBuilder, PipelineReport, RunSpec};

// Re-export base model types
pub use base_model::{BaseModel, BaseModelId, BaseModelMetadata};

// Re-export error types
pub use error::{Result as TanrenResult, TanrenError};

// Feature-gated re-exports
#[cfg(feature = "candle")]
pub use tanren_candle::{CandleLoraTuner, LlamaConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::TanrenConfig;
    pub use crate::pipeline::{FinetunePipeline, RunSpec};
    pub use tanren_core::{TrainJob, TrainReport, Tuner};
}
