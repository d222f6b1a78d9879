// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training losses to history.csv after each epoch and
// the final evaluation to evaluation.json.
//
// Columns (c = classification, o = caption / "output"):
//   epoch,train_c_loss,train_o_loss,valid_c_loss,valid_o_loss
//   1,0.412300,4.981200,0.398100,4.702300
//   2,0.301100,4.120900,0.310400,4.277700
//
// The file is truncated when a training run starts, so it always
// describes the weights currently in the output directory.
//
// How to read it:
//   - valid_o_loss drives checkpointing (train_o_loss without a
//     validation split); it should fall epoch to epoch
//   - valid rising while train falls means overfitting
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::ml::evaluator::SplitEvaluation;

const HISTORY_FILE: &str = "history.csv";
const EVALUATION_FILE: &str = "evaluation.json";

/// Average losses of one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch:        usize,
    pub train_c_loss: f64,
    pub train_o_loss: f64,
    pub valid_c_loss: f64,
    pub valid_o_loss: f64,
}

impl EpochMetrics {
    /// The caption loss checkpointing follows: validation, or training
    /// when there is no validation split.
    pub fn monitored_loss(&self, has_valid: bool) -> f64 {
        if has_valid { self.valid_o_loss } else { self.train_o_loss }
    }

    /// Perplexity of the validation captions, `exp(valid_o_loss)`.
    pub fn valid_perplexity(&self) -> f64 {
        self.valid_o_loss.exp()
    }
}

/// Appends one row per epoch to `<dir>/history.csv`.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Start a fresh history: any previous file is replaced by a header row.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(HISTORY_FILE);

        let mut w = csv::Writer::from_path(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        w.write_record(["epoch", "train_c_loss", "train_o_loss", "valid_c_loss", "valid_o_loss"])?;
        w.flush()?;

        tracing::debug!("Created history CSV: '{}'", csv_path.display());
        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        w.write_record([
            m.epoch.to_string(),
            format!("{:.6}", m.train_c_loss),
            format!("{:.6}", m.train_o_loss),
            format!("{:.6}", m.valid_c_loss),
            format!("{:.6}", m.valid_o_loss),
        ])?;
        w.flush()?;

        tracing::debug!(
            "Logged epoch {}: train_o_loss={:.4}, valid_o_loss={:.4}",
            m.epoch,
            m.train_o_loss,
            m.valid_o_loss,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

/// Write every split's metrics to `<dir>/evaluation.json`.
pub fn write_evaluation(dir: &Path, results: &[SplitEvaluation]) -> Result<PathBuf> {
    let path = dir.join(EVALUATION_FILE);
    let json = serde_json::to_string_pretty(results)?;
    fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
    Ok(path)
}
