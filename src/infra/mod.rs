// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything persisted in the output directory:
//
//   checkpoint.rs      - encoder / decoder weights as gzip named
//                        msgpack records, plus train_config.json and
//                        labels.json so a later run can rebuild the
//                        model before loading weights into it.
//
//   tokenizer_store.rs - the caption vocabulary. Counted over the
//                        training impressions and written as
//                        tokenizer.json, so training, evaluation and
//                        generation all see the same ids.
//
//   metrics.rs         - history.csv (one row of losses per epoch)
//                        and evaluation.json (final scores).
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary building, saving, and loading
pub mod tokenizer_store;

/// Training history and evaluation output
pub mod metrics;
