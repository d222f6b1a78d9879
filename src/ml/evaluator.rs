// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Scores trained weights on one split:
//
//   class_predictions → (y_true, sigmoid(logits))  → mAP @ threshold
//   caption_bleu      → greedy decode vs reference → mean BLEU-1
//
// Both walk the dataset in order, in fixed-size batches, on the
// inference backend (no autodiff).

use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, data::dataset::Dataset, prelude::*};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    batcher::{XRayBatch, XRayBatcher},
    dataset::{LabelSet, XRayDataset, XRayItem},
    preprocessor::word_pieces,
};
use crate::eval::{
    bleu::bleu1,
    classification::{evaluate_predictions, ClassificationReport},
};
use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::CaptionTokenizer};
use crate::ml::decoder::DecodeStrategy;
use crate::ml::encoder::EncoderCnn;
use crate::ml::model::{ReportModel, ReportModelConfig};
use crate::ml::trainer::progress_bar;

/// Metrics for one split, as written to evaluation.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitEvaluation {
    pub split:          String,
    pub samples:        usize,
    pub classification: ClassificationReport,
    pub bleu1:          f64,
}

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub batch_size:     usize,
    pub threshold:      f32,
    pub max_decode_len: usize,
}

/// Load the best weights from `ckpt_manager` and score each named split.
pub fn run_evaluation<B: Backend>(
    model_cfg:    &ReportModelConfig,
    ckpt_manager: &CheckpointManager,
    splits:       &[(&str, &XRayDataset)],
    labels:       &LabelSet,
    tokenizer:    &CaptionTokenizer,
    opts:         &EvalOptions,
    device:       &B::Device,
) -> Result<Vec<SplitEvaluation>> {
    let model: ReportModel<B> = model_cfg.init(device);
    let model = ckpt_manager.load_weights(model, device)?;

    splits
        .iter()
        .map(|(name, dataset)| evaluate_split(name, &model, dataset, labels, tokenizer, opts, device))
        .collect()
}

pub fn evaluate_split<B: Backend>(
    split:     &str,
    model:     &ReportModel<B>,
    dataset:   &XRayDataset,
    labels:    &LabelSet,
    tokenizer: &CaptionTokenizer,
    opts:      &EvalOptions,
    device:    &B::Device,
) -> Result<SplitEvaluation> {
    let (y_true, y_prob) = class_predictions(&model.encoder, dataset, opts.batch_size, device)?;
    let classification = evaluate_predictions(&y_true, &y_prob, labels.classes(), opts.threshold);
    let bleu = caption_bleu(model, dataset, tokenizer, opts, device)?;

    tracing::info!(
        "{}: {} samples, mAP={:.3}, BLEU-1={:.3}",
        split, y_true.len(), classification.mean_ap, bleu
    );
    Ok(SplitEvaluation {
        split:   split.to_string(),
        samples: y_true.len(),
        classification,
        bleu1:   bleu,
    })
}

/// Ground-truth multi-hot rows and predicted class probabilities.
pub fn class_predictions<B: Backend>(
    encoder:    &EncoderCnn<B>,
    dataset:    &XRayDataset,
    batch_size: usize,
    device:     &B::Device,
) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
    let mut y_true = Vec::with_capacity(dataset.len());
    let mut y_prob = Vec::with_capacity(dataset.len());

    for_each_batch::<B, _>(dataset, batch_size, device, "class predictions", |items, batch| {
        let [n, classes] = batch.labels.dims();
        let probs: Vec<f32> = burn::tensor::activation::sigmoid(encoder.forward(batch.images).logits)
            .into_data()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Failed to read class probabilities: {e:?}"))?;

        debug_assert_eq!(probs.len(), n * classes);
        for (item, row) in items.iter().zip(probs.chunks(classes.max(1))) {
            y_true.push(item.labels.clone());
            y_prob.push(row.to_vec());
        }
        Ok(())
    })?;

    Ok((y_true, y_prob))
}

/// Mean sentence BLEU-1 of greedy captions against the reference impressions.
pub fn caption_bleu<B: Backend>(
    model:     &ReportModel<B>,
    dataset:   &XRayDataset,
    tokenizer: &CaptionTokenizer,
    opts:      &EvalOptions,
    device:    &B::Device,
) -> Result<f64> {
    let mut rng   = StdRng::seed_from_u64(0);
    let mut total = 0.0;
    let mut count = 0usize;

    for_each_batch::<B, _>(dataset, opts.batch_size, device, "BLEU-1", |items, batch| {
        let features = model.encoder.forward(batch.images).features;
        let sampled  = model.decoder.sample(features, opts.max_decode_len, DecodeStrategy::Greedy, &mut rng)?;

        for ((item, uid), generated) in items.iter().zip(&batch.uids).zip(&sampled) {
            let reference = tokenizer.decode_caption(&item.tokens)?;
            let candidate = tokenizer.decode_caption(generated)?;
            let score = bleu1(&word_pieces(&reference), &word_pieces(&candidate));
            tracing::trace!("{}: '{}' BLEU-1={:.3}", uid, candidate, score);
            total += score;
            count += 1;
        }
        Ok(())
    })?;

    Ok(if count == 0 { 0.0 } else { total / count as f64 })
}

/// Walk `dataset` in order, `batch_size` items at a time. Items whose
/// image fails to decode are dropped by the dataset.
fn for_each_batch<B, F>(
    dataset:    &XRayDataset,
    batch_size: usize,
    device:     &B::Device,
    label:      &str,
    mut f:      F,
) -> Result<()>
where
    B: Backend,
    F: FnMut(&[XRayItem], XRayBatch<B>) -> Result<()>,
{
    let batch_size = batch_size.max(1);
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let bar = progress_bar(indices.len().div_ceil(batch_size), label);
    let batcher = XRayBatcher::new();

    for chunk in indices.chunks(batch_size) {
        let items: Vec<XRayItem> = chunk.iter().filter_map(|&i| dataset.get(i)).collect();
        bar.inc(1);
        if items.is_empty() {
            continue;
        }
        let batch = Batcher::<B, XRayItem, XRayBatch<B>>::batch(&batcher, items.clone(), device);
        f(&items, batch)?;
    }
    bar.finish_and_clear();
    Ok(())
}
