// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Framework-free scoring used after training:
//
//   classification.rs - precision / recall / average precision per
//                       problem class from thresholded probabilities,
//                       and their mean (mAP)
//
//   bleu.rs           - sentence-level BLEU-1 between a generated
//                       impression and its reference
//
// Both operate on plain slices so they are testable without a
// device and reusable outside the training binary.

/// Multi-label classification metrics
pub mod classification;

/// Unigram BLEU with brevity penalty
pub mod bleu;
