//! The two training signals.
//!
//! - `multilabel_bce_with_logits`: problem classification, one independent
//!   sigmoid per class.
//! - `masked_cross_entropy`: next-token prediction over the caption, with
//!   padding positions excluded from both the sum and the count.

use burn::prelude::*;
use burn::tensor::activation::log_softmax;

/// Binary cross-entropy on raw logits, averaged over every (sample, class).
///
/// Uses the stable form `max(x, 0) - x·y + ln(1 + e^{-|x|})`, which never
/// exponentiates a positive number.
///
/// - `logits`: `(batch, classes)`
/// - `targets`: `(batch, classes)` multi-hot in {0, 1}
pub fn multilabel_bce_with_logits<B: Backend>(
    logits:  Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let positive = logits.clone().clamp_min(0.0);
    let log_term = logits.clone().abs().neg().exp().add_scalar(1.0).log();
    (positive - logits * targets + log_term).mean()
}

/// Token-level cross-entropy averaged over non-padding positions.
///
/// - `logits`: `(batch, seq, vocab)`
/// - `targets`: `(batch, seq)` token ids
/// - `mask`: `(batch, seq)`, 1 for real tokens, 0 for padding
///
/// An all-padding batch yields 0.
pub fn masked_cross_entropy<B: Backend>(
    logits:  Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    mask:    Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch, seq, _vocab] = logits.dims();

    let log_probs = log_softmax(logits, 2);
    let picked = log_probs
        .gather(2, targets.reshape([batch, seq, 1]))
        .reshape([batch, seq]);

    let nll   = picked.neg() * mask.clone();
    let count = mask.sum().clamp_min(1.0);
    nll.sum() / count
}
