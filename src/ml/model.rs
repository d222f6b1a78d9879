use burn::prelude::*;

use crate::ml::decoder::{DecoderRnn, DecoderRnnConfig};
use crate::ml::encoder::{EncoderCnn, EncoderCnnConfig};
use crate::ml::loss::{masked_cross_entropy, multilabel_bce_with_logits};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct ReportModelConfig {
    pub encoder: EncoderCnnConfig,
    pub decoder: DecoderRnnConfig,
}

impl ReportModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ReportModel<B> {
        ReportModel {
            encoder: self.encoder.init(device),
            decoder: self.decoder.init(device),
        }
    }
}

/// Encoder and decoder held together so a single optimizer steps both.
/// They are still checkpointed as two separate records.
#[derive(Module, Debug)]
pub struct ReportModel<B: Backend> {
    pub encoder: EncoderCnn<B>,
    pub decoder: DecoderRnn<B>,
}

/// Per-batch losses, each a scalar tensor.
pub struct StepLosses<B: Backend> {
    pub class_loss:   Tensor<B, 1>,
    pub caption_loss: Tensor<B, 1>,
}

impl<B: Backend> StepLosses<B> {
    /// Weighted sum used for the single backward pass.
    pub fn combined(&self, class_weight: f64, caption_weight: f64) -> Tensor<B, 1> {
        self.class_loss.clone().mul_scalar(class_weight)
            + self.caption_loss.clone().mul_scalar(caption_weight)
    }
}

impl<B: Backend> ReportModel<B> {
    pub fn forward_losses(
        &self,
        images:   Tensor<B, 4>,
        labels:   Tensor<B, 2>,
        captions: Tensor<B, 2, Int>,
        mask:     Tensor<B, 2>,
    ) -> StepLosses<B> {
        let encoded = self.encoder.forward(images);
        let class_loss = multilabel_bce_with_logits(encoded.logits, labels);

        let logits = self.decoder.forward(encoded.features, captions.clone());
        let caption_loss = masked_cross_entropy(logits, captions, mask);

        StepLosses { class_loss, caption_loss }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray<f32>;

    pub fn tiny_config(num_classes: usize, vocab_size: usize) -> ReportModelConfig {
        ReportModelConfig::new(
            EncoderCnnConfig::new(8, num_classes)
                .with_base_channels(4)
                .with_blocks_per_stage(1),
            DecoderRnnConfig::new(8, 8, vocab_size, 1),
        )
    }

    #[test]
    fn test_forward_losses_are_finite_scalars() {
        let device = Default::default();
        let model: ReportModel<TestBackend> = tiny_config(3, 10).init(&device);

        let images   = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let labels   = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 0.0, 0.0], [0.0, 1.0, 1.0]]),
            &device,
        );
        let captions = Tensor::<TestBackend, 2, Int>::from_data(
            TensorData::from([[1_i64, 5, 2], [1, 2, 0]]),
            &device,
        );
        let mask = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[1.0_f32, 1.0, 1.0], [1.0, 1.0, 0.0]]),
            &device,
        );

        let losses = model.forward_losses(images, labels, captions, mask);
        let c: f32 = losses.class_loss.clone().into_scalar().elem();
        let o: f32 = losses.caption_loss.clone().into_scalar().elem();
        assert!(c.is_finite() && c > 0.0);
        assert!(o.is_finite() && o > 0.0);

        let total: f32 = losses.combined(1.0, 2.0).into_scalar().elem();
        assert!((total - (c + 2.0 * o)).abs() < 1e-4);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg = tiny_config(4, 20);
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ReportModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.encoder.num_classes, 4);
        assert_eq!(back.decoder.vocab_size, 20);
        assert_eq!(back.encoder.base_channels, 4);
    }
}
