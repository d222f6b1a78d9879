// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflows built from the data, ml and infra layers:
//
//   train_use_case.rs    CSV → splits → vocab + labels → train
//                        → reload best weights → mAP / BLEU-1
//   generate_use_case.rs output directory + one image → report
//
// The CLI (Layer 1) parses flags into a TrainConfig and prints what
// these return; no tensors are touched here.

// Training followed by train / valid / test evaluation
pub mod train_use_case;

// Single-image report generation
pub mod generate_use_case;
