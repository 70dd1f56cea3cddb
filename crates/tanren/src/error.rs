//! Error types for tanren crate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TanrenError {
    #[error("Core error: {0}")]
    Core(#[from] tanren_core::CoreError),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Base model error: {0}")]
    BaseModel(#[from] crate::base_model::BaseModelError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] crate::dataset::DatasetError),

    #[error("LoRA error: {0}")]
    Lora(#[from] crate::lora::LoraError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[cfg(feature = "candle")]
    #[error("Candle error: {0}")]
    Candle(#[from] tanren_candle::error::CandleError),
}

pub type Result<T> = std::result::Result<T, TanrenError>;
