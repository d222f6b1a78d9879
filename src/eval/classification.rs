//! Multi-label classification metrics over problem classes.
//!
//! Probabilities are first binarised at a threshold (0.1 by default) and
//! every metric is then computed per class on the binarised predictions.

use serde::{Deserialize, Serialize};

/// Default probability cut-off for a class to count as predicted
pub const DEFAULT_THRESHOLD: f32 = 0.1;

/// Metrics for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class:     String,
    pub precision: f64,
    pub recall:    f64,
    /// `None` when the class has no positive example in the split
    pub ap:        Option<f64>,
    /// Number of positive examples
    pub support:   usize,
    /// Number of examples predicted positive
    pub predicted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub threshold: f32,
    pub per_class: Vec<ClassMetrics>,
    /// Mean of the defined per-class APs; 0 when none is defined
    pub mean_ap:   f64,
}

/// Binarise `y_prob` at `threshold` and score each column against `y_true`.
///
/// `y_true` and `y_prob` are row-major `[samples][classes]`; `classes` names
/// the columns.
pub fn evaluate_predictions(
    y_true:    &[Vec<f32>],
    y_prob:    &[Vec<f32>],
    classes:   &[String],
    threshold: f32,
) -> ClassificationReport {
    debug_assert_eq!(y_true.len(), y_prob.len());

    let per_class: Vec<ClassMetrics> = classes
        .iter()
        .enumerate()
        .map(|(c, name)| {
            let truth: Vec<bool> = y_true.iter().map(|row| row[c] >= 0.5).collect();
            let pred:  Vec<f64>  = y_prob
                .iter()
                .map(|row| if row[c] >= threshold { 1.0 } else { 0.0 })
                .collect();

            let (precision, recall) = precision_recall(&truth, &pred);
            ClassMetrics {
                class:     name.clone(),
                precision,
                recall,
                ap:        average_precision(&truth, &pred),
                support:   truth.iter().filter(|&&t| t).count(),
                predicted: pred.iter().filter(|&&p| p > 0.5).count(),
            }
        })
        .collect();

    let defined: Vec<f64> = per_class.iter().filter_map(|m| m.ap).collect();
    let mean_ap = if defined.is_empty() {
        0.0
    } else {
        defined.iter().sum::<f64>() / defined.len() as f64
    };

    ClassificationReport { threshold, per_class, mean_ap }
}

/// Precision and recall of binary predictions (`pred > 0.5` is positive).
/// Undefined ratios (no predicted / no actual positives) are reported as 0.
pub fn precision_recall(truth: &[bool], pred: &[f64]) -> (f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&t, &p) in truth.iter().zip(pred) {
        match (t, p > 0.5) {
            (true, true)   => tp += 1,
            (false, true)  => fp += 1,
            (true, false)  => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = ratio(tp, tp + fp);
    let recall    = ratio(tp, tp + fn_);
    (precision, recall)
}

/// Average precision of `scores` against binary `truth`:
///
/// ```text
/// AP = Σ_k (R_k − R_{k−1}) · P_k
/// ```
///
/// over the distinct score thresholds in descending order, where tied
/// scores form a single step. Returns `None` if `truth` has no positive.
pub fn average_precision(truth: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = truth.iter().filter(|&&t| t).count();
    if positives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ap          = 0.0;
    let mut tp          = 0usize;
    let mut seen        = 0usize;
    let mut prev_recall = 0.0;

    let mut i = 0;
    while i < order.len() {
        // Consume every sample tied at this threshold
        let score = scores[order[i]];
        while i < order.len() && scores[order[i]] == score {
            if truth[order[i]] {
                tp += 1;
            }
            seen += 1;
            i += 1;
        }
        let precision = tp as f64 / seen as f64;
        let recall    = tp as f64 / positives as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }

    Some(ap)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
