// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds the trained model from an output directory and writes
// a report for a single image:
//
//   image → ImageTransform → encoder → sigmoid → findings ≥ threshold
//                                    → features → decoder.sample → impression
use anyhow::Result;
use burn::{prelude::*, tensor::TensorData};
use rand::{rngs::StdRng, SeedableRng};
use std::{cell::RefCell, path::Path};

use crate::application::train_use_case::TrainConfig;
use crate::data::{dataset::LabelSet, image::ImageTransform};
use crate::domain::{report::GeneratedReport, traits::ReportGenerator};
use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::CaptionTokenizer};
use crate::ml::decoder::DecodeStrategy;
use crate::ml::model::ReportModel;

type InferBackend = burn::backend::Wgpu;

pub struct Generator<B: Backend = InferBackend> {
    model:          ReportModel<B>,
    labels:         LabelSet,
    tokenizer:      CaptionTokenizer,
    transform:      ImageTransform,
    threshold:      f32,
    max_decode_len: usize,
    strategy:       DecodeStrategy,
    rng:            RefCell<StdRng>,
    device:         B::Device,
}

impl Generator<InferBackend> {
    /// Load config, labels, tokenizer and weights saved by `train`.
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        tokenizer:    CaptionTokenizer,
        threshold:    f32,
        temperature:  f32,
        seed:         u64,
    ) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = ckpt_manager.load_config()?;
        let labels = ckpt_manager.load_labels()?;

        let model_cfg = cfg.model_config(labels.len(), tokenizer.vocab_size());
        let model: ReportModel<InferBackend> = model_cfg.init(&device);
        let model = ckpt_manager.load_weights(model, &device)?;
        tracing::info!("Model loaded from '{}'", ckpt_manager.dir().display());

        Ok(Self::new(model, labels, tokenizer, &cfg, threshold, temperature, seed, device))
    }
}

impl<B: Backend> Generator<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model:       ReportModel<B>,
        labels:      LabelSet,
        tokenizer:   CaptionTokenizer,
        cfg:         &TrainConfig,
        threshold:   f32,
        temperature: f32,
        seed:        u64,
        device:      B::Device,
    ) -> Self {
        Self {
            model,
            labels,
            tokenizer,
            transform:      ImageTransform::new(cfg.image_size),
            threshold,
            max_decode_len: cfg.max_decode_len,
            strategy:       DecodeStrategy::from_temperature(temperature),
            rng:            RefCell::new(StdRng::seed_from_u64(seed)),
            device,
        }
    }

    /// Run the model on an already-normalised CHW image.
    pub fn generate_from_pixels(&self, pixels: Vec<f32>) -> Result<GeneratedReport> {
        let side = self.transform.size;
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [1, 3, side, side]),
            &self.device,
        );
        let encoded = self.model.encoder.forward(images);

        let probs: Vec<f32> = burn::tensor::activation::sigmoid(encoded.logits)
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Failed to read class probabilities: {e:?}"))?;
        let mut findings: Vec<(String, f32)> = self
            .labels
            .classes()
            .iter()
            .zip(probs)
            .filter(|(_, p)| *p >= self.threshold)
            .map(|(c, p)| (c.clone(), p))
            .collect();
        findings.sort_by(|a, b| b.1.total_cmp(&a.1));

        let sampled = self.model.decoder.sample(
            encoded.features,
            self.max_decode_len,
            self.strategy,
            &mut *self.rng.borrow_mut(),
        )?;
        let impression = match sampled.first() {
            Some(ids) => self.tokenizer.decode_caption(ids)?,
            None => String::new(),
        };

        tracing::debug!("{} findings above {:.2}; impression '{}'", findings.len(), self.threshold, impression);
        Ok(GeneratedReport { findings, impression })
    }
}

impl<B: Backend> ReportGenerator for Generator<B> {
    fn generate(&self, image: &Path) -> Result<GeneratedReport> {
        let pixels = self.transform.load(image)?;
        self.generate_from_pixels(pixels)
    }
}
