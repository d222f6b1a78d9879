// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Joint train + validation loop using Burn's DataLoader and Adam.
//
// Per batch:
//   logits, features = encoder(images)
//   class_loss   = BCE(logits, labels)
//   caption_loss = masked CE(decoder(features, captions), captions)
//   total        = w_c·class_loss + w_o·caption_loss
//   backward(total × S) → unscale → step (skipped on overflow)
//
// Key Burn 0.20 insight:
//   - Training runs on an AutodiffBackend (Autodiff<Wgpu> from the CLI)
//   - model.valid() returns the model on its InnerBackend
//   - Validation loader must also use the inner backend
//
// Checkpoints are rewritten only when the validation caption loss
// strictly improves on the best seen so far (the training caption
// loss when the validation split is empty).
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use std::{path::Path, sync::Arc};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use indicatif::{ProgressBar, ProgressStyle};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{XRayBatch, XRayBatcher},
    dataset::{XRayDataset, XRayItem},
};
use crate::infra::{
    checkpoint::{load_encoder_from, CheckpointManager},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{ReportModel, ReportModelConfig};
use crate::ml::scaler::LossScaler;

/// Build a fresh model (warm-starting the encoder from `--pretrained`)
/// and train it on `device`.
pub fn run_training<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model_cfg:     &ReportModelConfig,
    train_dataset: Arc<XRayDataset>,
    valid_dataset: Arc<XRayDataset>,
    ckpt_manager:  &CheckpointManager,
    device:        &B::Device,
) -> Result<Vec<EpochMetrics>> {
    tracing::info!("Training on device: {:?}", device);

    let mut model: ReportModel<B> = model_cfg.init(device);
    if let Some(path) = &cfg.pretrained {
        model.encoder = load_encoder_from(model.encoder, Path::new(path), device)?;
        tracing::info!("Encoder warm-started from '{}'", path);
    }

    let (_, history) = train_loop(cfg, model, train_dataset, valid_dataset, ckpt_manager, device)?;
    Ok(history)
}

/// Backend-generic epoch loop. Returns the final model and the
/// per-epoch history; the best weights are on disk.
pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    mut model:     ReportModel<B>,
    train_dataset: Arc<XRayDataset>,
    valid_dataset: Arc<XRayDataset>,
    ckpt_manager:  &CheckpointManager,
    device:        &B::Device,
) -> Result<(ReportModel<B>, Vec<EpochMetrics>)> {
    let train_batches = train_dataset.sample_count().div_ceil(cfg.batch_size.max(1));
    let has_valid     = valid_dataset.sample_count() > 0;
    if !has_valid {
        tracing::warn!("Validation split is empty; checkpoints follow the training caption loss");
    }

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // One optimiser over encoder + decoder parameters
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(cfg.max_grad_norm.map(GradientClippingConfig::Norm))
        .init::<B, ReportModel<B>>();
    let mut scaler = LossScaler::new(cfg.loss_scaling);

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let mut train_builder = DataLoaderBuilder::<B, XRayItem, XRayBatch<B>>::new(XRayBatcher::new())
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .set_device(device.clone());
    if cfg.num_workers > 0 {
        train_builder = train_builder.num_workers(cfg.num_workers);
    }
    let train_loader: Arc<dyn DataLoader<B, XRayBatch<B>>> = train_builder.build(train_dataset);

    // ── Validation data loader (InnerBackend, no autodiff) ───────────────────
    let mut valid_builder =
        DataLoaderBuilder::<B::InnerBackend, XRayItem, XRayBatch<B::InnerBackend>>::new(XRayBatcher::new())
        .batch_size(cfg.batch_size)
        .set_device(device.clone());
    if cfg.num_workers > 0 {
        valid_builder = valid_builder.num_workers(cfg.num_workers);
    }
    let valid_loader: Arc<dyn DataLoader<B::InnerBackend, XRayBatch<B::InnerBackend>>> =
        valid_builder.build(valid_dataset);

    let metrics_logger = MetricsLogger::create(ckpt_manager.dir())?;
    let mut history = Vec::with_capacity(cfg.epochs);
    let mut best = BestCheckpoint::new(has_valid);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let bar = progress_bar(train_batches, &format!("epoch {epoch}/{}", cfg.epochs));
        let mut train = RunningLoss::default();
        let mut tokens = 0usize;

        for batch in train_loader.iter() {
            tokens += batch.lengths.iter().sum::<usize>();
            let losses = model.forward_losses(
                batch.images,
                batch.labels,
                batch.captions,
                batch.mask,
            );
            let c: f64 = losses.class_loss.clone().into_scalar().elem::<f64>();
            let o: f64 = losses.caption_loss.clone().into_scalar().elem::<f64>();

            let total = losses.combined(cfg.class_loss_weight, cfg.caption_loss_weight);
            let grads = scaler.scale_loss(total).backward();
            let grads = GradientsParams::from_grads(grads, &model);
            let (grads, grads_finite) = scaler.unscale::<B, _>(&model, grads);

            if scaler.update(grads_finite && c.is_finite() && o.is_finite()) {
                model = optim.step(cfg.lr, model, grads);
                train.add(c, o);
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        tracing::debug!("Epoch {}: {} caption tokens seen", epoch, tokens);

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → ReportModel<InnerBackend>, dropout disabled
        let model_valid = model.valid();
        let mut valid = RunningLoss::default();

        for batch in valid_loader.iter() {
            let losses = model_valid.forward_losses(
                batch.images,
                batch.labels,
                batch.captions,
                batch.mask,
            );
            valid.add(
                losses.class_loss.into_scalar().elem::<f64>(),
                losses.caption_loss.into_scalar().elem::<f64>(),
            );
        }

        let (train_c_loss, train_o_loss) = train.mean();
        let (valid_c_loss, valid_o_loss) = valid.mean();
        let metrics = EpochMetrics { epoch, train_c_loss, train_o_loss, valid_c_loss, valid_o_loss };

        println!(
            "Epoch {:>3}/{} | train c={:.4} o={:.4} ppl={:.2} | valid c={:.4} o={:.4} ppl={:.2}",
            epoch, cfg.epochs,
            train_c_loss, train_o_loss, train_o_loss.exp(),
            valid_c_loss, valid_o_loss, metrics.valid_perplexity(),
        );
        metrics_logger.log(&metrics)?;

        if best.observe(&metrics) {
            ckpt_manager.save_weights(&model)?;
            tracing::info!("Epoch {}: caption loss improved to {:.4}, weights saved", epoch, best.loss());
        }
        history.push(metrics);
    }

    if scaler.skipped_steps() > 0 {
        tracing::warn!("{} optimizer steps skipped on non-finite gradients", scaler.skipped_steps());
    }
    tracing::info!(
        "Training complete! Best caption loss {:.4}, history in '{}'",
        best.loss(),
        metrics_logger.csv_path().display()
    );
    Ok((model, history))
}

/// Best-only rule: an epoch wins when its monitored caption loss is
/// strictly below every earlier one. NaN never wins.
#[derive(Debug)]
struct BestCheckpoint {
    has_valid: bool,
    loss:      f64,
}

impl BestCheckpoint {
    fn new(has_valid: bool) -> Self {
        Self { has_valid, loss: f64::INFINITY }
    }

    fn observe(&mut self, metrics: &EpochMetrics) -> bool {
        let loss = metrics.monitored_loss(self.has_valid);
        if loss < self.loss {
            self.loss = loss;
            true
        } else {
            false
        }
    }

    fn loss(&self) -> f64 {
        self.loss
    }
}

/// Running sums of the two losses over one phase.
#[derive(Debug, Default)]
struct RunningLoss {
    class:   f64,
    caption: f64,
    batches: usize,
}

impl RunningLoss {
    fn add(&mut self, class: f64, caption: f64) {
        self.class   += class;
        self.caption += caption;
        self.batches += 1;
    }

    /// NaN for a phase without batches, so it never wins checkpointing.
    fn mean(&self) -> (f64, f64) {
        if self.batches == 0 {
            return (f64::NAN, f64::NAN);
        }
        let n = self.batches as f64;
        (self.class / n, self.caption / n)
    }
}

pub(crate) fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(label.to_string());
    pb
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::LabelSet;
    use crate::data::image::ImageTransform;
    use crate::domain::report::Report;
    use crate::infra::tokenizer_store::CaptionTokenizer;
    use crate::ml::decoder::DecoderRnnConfig;
    use crate::ml::encoder::EncoderCnnConfig;
    use burn::backend::{ndarray::NdArray, Autodiff};

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn test_running_loss_mean() {
        let mut r = RunningLoss::default();
        assert!(r.mean().0.is_nan());
        r.add(1.0, 4.0);
        r.add(3.0, 2.0);
        assert_eq!(r.mean(), (2.0, 3.0));
    }

    fn epoch(epoch: usize, train_o_loss: f64, valid_o_loss: f64) -> EpochMetrics {
        EpochMetrics { epoch, train_c_loss: 0.5, train_o_loss, valid_c_loss: 0.5, valid_o_loss }
    }

    #[test]
    fn test_best_checkpoint_only_strict_improvements_win() {
        let mut best = BestCheckpoint::new(true);
        let saved: Vec<bool> = [3.0, 3.0, 2.5, f64::NAN, 2.6, 2.4]
            .iter()
            .enumerate()
            .map(|(i, &v)| best.observe(&epoch(i + 1, 9.0, v)))
            .collect();
        assert_eq!(saved, vec![true, false, true, false, false, true]);
        assert_eq!(best.loss(), 2.4);
    }

    #[test]
    fn test_best_checkpoint_without_validation_follows_training_loss() {
        let mut best = BestCheckpoint::new(false);
        assert!(best.observe(&epoch(1, 4.0, f64::NAN)));
        assert!(!best.observe(&epoch(2, 4.2, f64::NAN)));
        assert!(best.observe(&epoch(3, 3.9, f64::NAN)));
    }

    struct Fixture {
        tmp:       tempfile::TempDir,
        dataset:   Arc<XRayDataset>,
        empty:     Arc<XRayDataset>,
        model_cfg: ReportModelConfig,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let images = tmp.path().join("images");
        std::fs::create_dir_all(&images).unwrap();

        let reports: Vec<Report> = (0..4)
            .map(|i| {
                image::RgbImage::from_pixel(20, 16, image::Rgb([40 * i as u8, 90, 200]))
                    .save(images.join(format!("u{i}.png")))
                    .unwrap();
                let problem = if i % 2 == 0 { "normal" } else { "Opacity" };
                Report::new(format!("u{i}"), vec![problem.to_string()], "", "no acute disease.")
            })
            .collect();

        let labels    = LabelSet::from_reports(&reports);
        let tokenizer = CaptionTokenizer::build(&reports, 1).unwrap();
        let build = |r: &[Report]| {
            Arc::new(
                XRayDataset::from_reports(r, &images, &labels, &tokenizer, ImageTransform::new(32))
                    .unwrap(),
            )
        };
        let dataset = build(&reports);
        let empty   = build(&[]);
        let model_cfg = ReportModelConfig::new(
            EncoderCnnConfig::new(8, labels.len()).with_base_channels(4).with_blocks_per_stage(1),
            DecoderRnnConfig::new(8, 8, tokenizer.vocab_size(), 1),
        );
        Fixture { tmp, dataset, empty, model_cfg }
    }

    fn tiny_config() -> TrainConfig {
        TrainConfig {
            batch_size: 2,
            epochs: 2,
            num_workers: 0,
            loss_scaling: false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_tiny_training_run_writes_history_and_weights() {
        let fx = fixture();
        let device = Default::default();
        let model: ReportModel<TestAutodiffBackend> = fx.model_cfg.init(&device);
        let ckpt = CheckpointManager::new(fx.tmp.path().join("out")).unwrap();

        let (_, history) =
            train_loop(&tiny_config(), model, fx.dataset.clone(), fx.dataset.clone(), &ckpt, &device)
                .unwrap();

        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|m| m.train_o_loss.is_finite() && m.valid_o_loss.is_finite()));
        assert!(ckpt.has_weights());

        let rows = std::fs::read_to_string(fx.tmp.path().join("out/history.csv")).unwrap();
        assert_eq!(rows.lines().count(), 3);
    }

    #[test]
    fn test_empty_validation_checkpoints_on_training_loss() {
        let fx = fixture();
        let device = Default::default();
        let model: ReportModel<TestAutodiffBackend> = fx.model_cfg.init(&device);
        let ckpt = CheckpointManager::new(fx.tmp.path().join("out")).unwrap();
        let cfg = TrainConfig { epochs: 1, ..tiny_config() };

        let (_, history) =
            train_loop(&cfg, model, fx.dataset.clone(), fx.empty.clone(), &ckpt, &device).unwrap();

        assert_eq!(history.len(), 1);
        assert!(history[0].valid_o_loss.is_nan());
        assert!(history[0].train_o_loss.is_finite());
        assert!(ckpt.has_weights());
    }
}
