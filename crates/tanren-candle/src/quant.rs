//! 4-bit quantization for frozen base weights
//!
//! Base projection weights are quantized once at load time and
//! dequantized on the fly inside the forward pass. Gradients never flow
//! through the base weight, only through the LoRA adapters, so the
//! dequantized matmul can run outside the autograd variable set.

use candle_core::quantized::{GgmlDType, QTensor};
use candle_core::{DType, Result as CandleResult, Tensor};

use crate::lora::LinearLayer;

/// Block size of the Q4_0 format
const Q4_BLOCK: usize = 32;

/// Frozen linear layer with 4-bit quantized weight
pub struct QuantLinear {
    weight: QTensor,
}

impl QuantLinear {
    /// Quantize a full precision weight of shape (out_features, in_features)
    ///
    /// The input feature dimension must be a multiple of the Q4_0 block
    /// size, which holds for all Llama projection shapes.
    pub fn quantize(weight: &Tensor) -> CandleResult<Self> {
        let (_, in_features) = weight.dims2()?;
        if in_features % Q4_BLOCK != 0 {
            candle_core::bail!(
                "cannot quantize weight with in_features {} (not a multiple of {})",
                in_features,
                Q4_BLOCK
            );
        }
        let weight = QTensor::quantize(&weight.to_dtype(DType::F32)?, GgmlDType::Q4_0)?;
        Ok(Self { weight })
    }

    /// Size of the quantized weight in bytes
    pub fn storage_size_in_bytes(&self) -> usize {
        self.weight.storage_size_in_bytes()
    }
}

impl LinearLayer for QuantLinear {
    fn forward(&self, x: &Tensor) -> CandleResult<Tensor> {
        let weight = self
            .weight
            .dequantize(x.device())?
            .to_dtype(x.dtype())?;
        x.broadcast_matmul(&weight.t()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{Device, Module};
    use candle_nn::Linear;

    #[test]
    fn test_constant_weight_survives_quantization() {
        let device = Device::Cpu;
        let weight = Tensor::full(0.5f32, (8, 32), &device).unwrap();
        let x = Tensor::ones((2, 32), DType::F32, &device).unwrap();

        let quant = QuantLinear::quantize(&weight).unwrap();
        let out = quant.forward(&x).unwrap();

        // Every output element is 32 * 0.5, Q4_0 represents a constant
        // block exactly
        let expected = 16.0f32;
        let values = out.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        for v in values {
            assert!((v - expected).abs() < 1e-3, "got {} expected {}", v, expected);
        }
    }

    #[test]
    fn test_quantized_output_close_to_full_precision() {
        let device = Device::Cpu;
        let weight = Tensor::randn(0f32, 0.02, (16, 64), &device).unwrap();
        let x = Tensor::randn(0f32, 1.0, (4, 64), &device).unwrap();

        let full = Linear::new(weight.clone(), None).forward(&x).unwrap();
        let quant = QuantLinear::quantize(&weight).unwrap().forward(&x).unwrap();

        let err = (&full - &quant)
            .unwrap()
            .abs()
            .unwrap()
            .mean_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let magnitude = full
            .abs()
            .unwrap()
            .mean_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(
            err < magnitude * 0.5 + 1e-3,
            "quantization error {} too large for magnitude {}",
            err,
            magnitude
        );
    }

    #[test]
    fn test_unaligned_in_features_rejected() {
        let device = Device::Cpu;
        let weight = Tensor::randn(0f32, 1.0, (8, 20), &device).unwrap();
        assert!(QuantLinear::quantize(&weight).is_err());
    }

    #[test]
    fn test_quantized_storage_smaller_than_f32() {
        let device = Device::Cpu;
        let weight = Tensor::randn(0f32, 1.0, (64, 64), &device).unwrap();
        let quant = QuantLinear::quantize(&weight).unwrap();

        let f32_bytes = 64 * 64 * 4;
        assert!(quant.storage_size_in_bytes() < f32_bytes / 4);
    }
}
