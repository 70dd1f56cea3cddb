//! Instruction samples for supervised finetuning

use serde::{Deserialize, Serialize};

/// A single instruction-following sample
///
/// Field names match the databricks-dolly-15k record layout so raw
/// jsonl rows deserialize directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionSample {
    /// The instruction given to the model
    pub instruction: String,
    /// Optional supporting context
    #[serde(default)]
    pub context: String,
    /// The expected response
    pub response: String,
    /// Sample category (e.g. "open_qa")
    #[serde(default)]
    pub category: String,
}

impl InstructionSample {
    /// Create a sample from an instruction and its response
    pub fn new(instruction: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            context: String::new(),
            response: response.into(),
            category: String::new(),
        }
    }

    /// Render the sample into the text format the trainer consumes
    pub fn to_training_text(&self) -> String {
        format!(
            "### Instruction:\n{}\n\n### Response:\n{}",
            self.instruction, self.response
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_text_format() {
        let sample = InstructionSample::new("Name three primary colors.", "Red, blue and yellow.");
        assert_eq!(
            sample.to_training_text(),
            "### Instruction:\nName three primary colors.\n\n### Response:\nRed, blue and yellow."
        );
    }

    #[test]
    fn test_deserialize_dolly_row() {
        let row = r#"{"instruction":"What is a dolly?","context":"","response":"A small platform on wheels.","category":"open_qa"}"#;
        let sample: InstructionSample = serde_json::from_str(row).unwrap();
        assert_eq!(sample.instruction, "What is a dolly?");
        assert_eq!(sample.category, "open_qa");
        assert!(sample.context.is_empty());
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let row = r#"{"instruction":"Say hi.","response":"Hi."}"#;
        let sample: InstructionSample = serde_json::from_str(row).unwrap();
        assert!(sample.context.is_empty());
        assert!(sample.category.is_empty());
    }
}
