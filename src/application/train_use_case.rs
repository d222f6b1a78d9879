// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training + evaluation pipeline in order:
//
//   Step 1: Load the reports CSV           (Layer 4 - data)
//   Step 2: Split train/valid/test         (Layer 4 - data)
//   Step 3: Build or load vocab + labels   (Layer 6 - infra)
//   Step 4: Build image datasets           (Layer 4 - data)
//   Step 5: Save config                    (Layer 6 - infra)
//   Step 6: Run training loop              (Layer 5 - ml)
//   Step 7: Reload best weights, evaluate  (Layer 5 - ml)
//   Step 8: Write evaluation.json          (Layer 6 - infra)
//
// With `test_only` the saved train_config.json is read first: its
// seed drives the split and its hyper-parameters the architecture.
// Step 3 then loads the saved vocab + labels and steps 5-6 are skipped.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};

use crate::data::{
    dataset::{LabelSet, XRayDataset},
    image::ImageTransform,
    loader::CsvReportLoader,
    splitter::split_reports,
};
use crate::domain::{report::Report, traits::ReportSource};
use crate::eval::classification::DEFAULT_THRESHOLD;
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::write_evaluation,
    tokenizer_store::{CaptionTokenizer, TokenizerStore},
};
use crate::ml::{
    decoder::DecoderRnnConfig,
    encoder::EncoderCnnConfig,
    evaluator::{run_evaluation, EvalOptions, SplitEvaluation},
    model::ReportModelConfig,
    trainer::run_training,
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a run. Saved as train_config.json so the
// evaluator and the generator rebuild exactly the same architecture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub csv_path:            String,
    pub image_dir:           String,
    pub outdir:              String,
    /// Encoder record to warm-start from
    pub pretrained:          Option<String>,
    /// Skip training and evaluate the weights already in `outdir`
    pub test_only:           bool,
    pub batch_size:          usize,
    pub epochs:              usize,
    pub lr:                  f64,
    pub image_size:          usize,
    pub embed_size:          usize,
    pub hidden_size:         usize,
    pub num_layers:          usize,
    pub base_channels:       usize,
    pub dropout:             f64,
    pub min_word_freq:       usize,
    pub num_workers:         usize,
    pub seed:                u64,
    pub threshold:           f32,
    pub max_decode_len:      usize,
    pub loss_scaling:        bool,
    pub max_grad_norm:       Option<f32>,
    pub class_loss_weight:   f64,
    pub caption_loss_weight: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            csv_path:            "xray-dataset/cleaned_reports.csv".to_string(),
            image_dir:           "xray-dataset/images".to_string(),
            outdir:              "saved_exp/baseline_model".to_string(),
            pretrained:          None,
            test_only:           false,
            batch_size:          4,
            epochs:              10,
            lr:                  1e-3,
            image_size:          256,
            embed_size:          128,
            hidden_size:         128,
            num_layers:          3,
            base_channels:       32,
            dropout:             0.2,
            min_word_freq:       1,
            num_workers:         2,
            seed:                1337,
            threshold:           DEFAULT_THRESHOLD,
            max_decode_len:      40,
            loss_scaling:        true,
            max_grad_norm:       None,
            class_loss_weight:   1.0,
            caption_loss_weight: 1.0,
        }
    }
}

impl TrainConfig {
    /// Model architecture for a label set of `num_classes` and a
    /// vocabulary of `vocab_size` tokens.
    pub fn model_config(&self, num_classes: usize, vocab_size: usize) -> ReportModelConfig {
        ReportModelConfig::new(
            EncoderCnnConfig::new(self.embed_size, num_classes)
                .with_base_channels(self.base_channels)
                .with_dropout(self.dropout),
            DecoderRnnConfig::new(self.embed_size, self.hidden_size, vocab_size, self.num_layers),
        )
    }

    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            batch_size:     self.batch_size,
            threshold:      self.threshold,
            max_decode_len: self.max_decode_len,
        }
    }
}

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the pipeline end to end on the default WGPU device.
    /// Returns the evaluation of every split, in the order train, valid, test.
    pub fn execute(&self) -> Result<Vec<SplitEvaluation>> {
        self.execute_on::<TrainBackend>(&Default::default())
    }

    /// Same pipeline on any autodiff backend; evaluation runs on its
    /// inner backend.
    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Vec<SplitEvaluation>> {
        let cfg  = &self.config;
        let ckpt = CheckpointManager::new(&cfg.outdir)?;
        let tok_store = TokenizerStore::new(&cfg.outdir);

        let arch = self.run_config(&ckpt)?;

        // ── Step 1: Load reports ──────────────────────────────────────────────
        let mut reports = CsvReportLoader::new(&cfg.csv_path).load_all()?;
        let before = reports.len();
        reports.retain(|r| r.has_impression());
        if reports.len() < before {
            tracing::warn!("Dropped {} reports without an impression", before - reports.len());
        }

        // ── Step 2: Train / valid / test split ────────────────────────────────
        let splits = split_reports(reports, arch.seed);
        tracing::info!(
            "Split: {} train, {} valid, {} test",
            splits.train.len(),
            splits.valid.len(),
            splits.test.len()
        );

        // ── Step 3: Vocabulary and label set ──────────────────────────────────
        // Built from the training split only; test mode reuses the saved ones.
        let (tokenizer, labels): (CaptionTokenizer, LabelSet) = if cfg.test_only {
            (tok_store.load()?, ckpt.load_labels()?)
        } else {
            let tokenizer = tok_store.build_and_save(&splits.train, cfg.min_word_freq)?;
            let labels    = LabelSet::from_reports(&splits.train);
            ckpt.save_labels(&labels)?;
            (tokenizer, labels)
        };
        if labels.is_empty() {
            tracing::warn!("Training split has no problem labels; mAP will be 0");
        }
        tracing::info!(
            "Vocabulary: {} tokens, {} problem classes",
            tokenizer.vocab_size(),
            labels.len()
        );

        // ── Step 4: Build Burn datasets ───────────────────────────────────────
        let image_dir = Path::new(&cfg.image_dir);
        let build = |reports: &[Report]| -> Result<Arc<XRayDataset>> {
            Ok(Arc::new(XRayDataset::from_reports(
                reports,
                image_dir,
                &labels,
                &tokenizer,
                ImageTransform::new(arch.image_size),
            )?))
        };
        let train_dataset = build(&splits.train)?;
        let valid_dataset = build(&splits.valid)?;
        let test_dataset  = build(&splits.test)?;

        let model_cfg = arch.model_config(labels.len(), tokenizer.vocab_size());

        // ── Steps 5 + 6: Save config, train ───────────────────────────────────
        if cfg.test_only {
            tracing::info!("Test mode: evaluating the weights in '{}'", cfg.outdir);
        } else {
            ckpt.save_config(cfg)?;
            run_training::<B>(cfg, &model_cfg, train_dataset.clone(), valid_dataset.clone(), &ckpt, device)?;
        }

        // ── Step 7: Reload best weights and evaluate ──────────────────────────
        tracing::info!("Load weights and run mAP and BLEU eval");
        let results = run_evaluation::<B::InnerBackend>(
            &model_cfg,
            &ckpt,
            &[
                ("train", train_dataset.as_ref()),
                ("valid", valid_dataset.as_ref()),
                ("test", test_dataset.as_ref()),
            ],
            &labels,
            &tokenizer,
            &cfg.eval_options(),
            device,
        )?;

        // ── Step 8: Persist the scores ────────────────────────────────────────
        let path = write_evaluation(ckpt.dir(), &results)?;
        tracing::info!("Evaluation written to '{}'", path.display());
        Ok(results)
    }

    /// Config that fixes the split seed and the architecture: the one saved
    /// by the training run in test mode, the current one otherwise.
    fn run_config(&self, ckpt: &CheckpointManager) -> Result<TrainConfig> {
        let cfg = &self.config;
        if !cfg.test_only {
            return Ok(cfg.clone());
        }
        if !ckpt.has_weights() {
            anyhow::bail!("No encoder/decoder weights in '{}'; train first or drop --test", cfg.outdir);
        }
        let saved = ckpt.load_config()?;
        if saved.seed != cfg.seed {
            tracing::info!("Using the saved split seed {} (not {})", saved.seed, cfg.seed);
        }
        Ok(saved)
    }
}
