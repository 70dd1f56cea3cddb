//! Error types for tanren-candle

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CandleError {
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Tokenizer error: {0}")]
    Tokenizer(#[from] tokenizers::Error),

    #[error("Invalid model config: {0}")]
    Config(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

// Convert CandleError to CoreError
impl From<CandleError> for tanren_core::CoreError {
    fn from(err: CandleError) -> Self {
        tanren_core::CoreError::Candle(err.to_string())
    }
}
