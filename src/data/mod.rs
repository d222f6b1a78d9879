// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the raw reports CSV to device tensor batches.
//
//   cleaned_reports.csv
//       │
//       ▼
//   CsvReportLoader   → parses rows into Reports
//       │
//       ▼
//   split_reports     → seeded train / valid / test partition
//       │
//       ▼
//   Preprocessor      → cleans impression text
//   CaptionTokenizer  → <start> … <end> token ids   (Layer 6)
//   LabelSet          → multi-hot problem vectors
//       │
//       ▼
//   XRayDataset       → implements Burn's Dataset trait,
//                       decodes images via ImageTransform
//       │
//       ▼
//   XRayBatcher       → pads captions, stacks tensors
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the reports CSV
pub mod loader;

/// Cleans report text, shared word splitting
pub mod preprocessor;

/// Seeded train/valid/test split by uid
pub mod splitter;

/// Image decoding, resize, crop and normalisation
pub mod image;

/// Label set and Burn Dataset implementation
pub mod dataset;

/// Burn Batcher implementation with caption padding
pub mod batcher;
