// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network, loss and training code lives here.
//
//   encoder.rs   - residual CNN: image → class logits + feature vector
//   decoder.rs   - stacked LSTM: feature vector → caption logits,
//                  greedy / temperature decoding
//   model.rs     - encoder + decoder as one module, joint losses
//   loss.rs      - multi-label BCE and masked caption cross-entropy
//   scaler.rs    - dynamic loss scaling for reduced precision
//   trainer.rs   - epoch loop, validation, best-only checkpointing
//   evaluator.rs - mAP and BLEU-1 over a split
//   inferencer.rs - single-image report generation
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vinyals et al. (2015) Show and Tell

/// Convolutional image encoder with classification and feature heads
pub mod encoder;

/// LSTM caption decoder
pub mod decoder;

/// Joint encoder-decoder module
pub mod model;

/// Training objectives
pub mod loss;

/// Dynamic loss scaler
pub mod scaler;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Split evaluation: mAP and BLEU-1
pub mod evaluator;

/// Inference engine - loads a checkpoint and writes a report
pub mod inferencer;
