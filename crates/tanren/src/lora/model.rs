use crate::base_model::BaseModelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumString};

/// NewType pattern for LoRA ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoraId(String);

impl LoraId {
    /// Create a new LoraId
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LoraId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LoraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LoRA status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LoraStatus {
    /// Adapter is trained and ready to use
    Available,
    /// Adapter is currently being trained
    Training,
    /// Adapter file is missing
    Missing,
    /// Training or registration failed
    Error,
}

/// LoRA adapter metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoraMetadata {
    // Adapter shape
    pub rank: Option<usize>,
    pub alpha: Option<f32>,

    // Whether the base weights were 4-bit quantized during training
    pub quantized_base: Option<bool>,

    // Training information
    pub training_info: Option<TrainingInfo>,

    // Base model the adapter was trained on
    pub base_model: Option<String>,

    // Version tracking
    pub version: Option<String>,
}

/// Training information for a LoRA
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingInfo {
    pub dataset: String,
    pub dataset_hash: Option<String>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub final_loss: Option<f32>,
    pub duration_secs: Option<u64>,
}

/// LoRA adapter representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lora {
    // Core fields (frequently used for search/display)
    pub id: LoraId,
    pub name: String,
    pub description: Option<String>,
    pub base_model_id: Option<BaseModelId>,
    pub created_at: String,
    pub status: LoraStatus,

    // File information (dynamic)
    pub file_path: Option<String>,
    pub size_bytes: Option<u64>,

    // Additional details
    pub metadata: LoraMetadata,
}

impl Lora {
    /// Create a new LoRA
    pub fn new(
        name: String,
        description: Option<String>,
        base_model_id: Option<BaseModelId>,
        metadata: LoraMetadata,
    ) -> Self {
        Self {
            id: LoraId::new(),
            name,
            description,
            base_model_id,
            created_at: chrono::Utc::now().to_rfc3339(),
            status: LoraStatus::Available,
            file_path: None,
            size_bytes: None,
            metadata,
        }
    }

    /// Create a new LoRA with an explicit status
    pub fn with_status(
        name: String,
        description: Option<String>,
        base_model_id: Option<BaseModelId>,
        metadata: LoraMetadata,
        status: LoraStatus,
    ) -> Self {
        let mut lora = Self::new(name, description, base_model_id, metadata);
        lora.status = status;
        lora
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(LoraStatus::Training.to_string(), "training");
        assert_eq!(
            LoraStatus::from_str("available").unwrap(),
            LoraStatus::Available
        );
        assert!(LoraStatus::from_str("bogus").is_err());
    }

    #[test]
    fn test_with_status() {
        let lora = Lora::with_status(
            "dolly-adapter".to_string(),
            None,
            None,
            LoraMetadata::default(),
            LoraStatus::Training,
        );
        assert_eq!(lora.status, LoraStatus::Training);
        assert!(lora.file_path.is_none());
    }
}
