//! # Tanren Core
//!
//! Core types and traits for the Tanren LoRA finetuning pipeline.

pub mod error;
pub mod run;
pub mod sample;
pub mod tuner;

pub use error::{CoreError, Result};
pub use run::RunId;
pub use sample::InstructionSample;
pub use tuner::{
    ComputeDtype, LoraParams, QuantMode, SharedTuner, TrainJob, TrainParams, TrainReport, Tuner,
    TunerExt, TunerMetadata,
};

#[cfg(test)]
mod tests {

    #[test]
    fn it_works() {
        assert_eq!(2 + 2, 4);
    }
}
