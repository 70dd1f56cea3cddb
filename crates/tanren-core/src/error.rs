//! Error types for tanren-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Training error: {0}")]
    Training(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Candle error: {0}")]
    Candle(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
