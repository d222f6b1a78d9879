// ============================================================
// Layer 2 — Generate Use Case
// ============================================================
// Writes a report for a single X-ray with the weights of a
// finished training run:
//   1. Load the tokenizer saved next to the checkpoints
//   2. Rebuild the model from train_config.json + labels.json
//   3. Predict findings and decode an impression

use anyhow::Result;
use std::path::Path;

use crate::domain::{report::GeneratedReport, traits::ReportGenerator};
use crate::infra::{checkpoint::CheckpointManager, tokenizer_store::TokenizerStore};
use crate::ml::inferencer::Generator;

pub struct GenerateUseCase {
    generator: Box<dyn ReportGenerator>,
}

impl GenerateUseCase {
    /// `temperature` 0 decodes greedily; above 0 samples with `seed`.
    pub fn new(outdir: &str, threshold: f32, temperature: f32, seed: u64) -> Result<Self> {
        let tokenizer = TokenizerStore::new(outdir).load()?;
        let ckpt      = CheckpointManager::new(outdir)?;
        let generator: Generator = Generator::from_checkpoint(&ckpt, tokenizer, threshold, temperature, seed)?;
        Ok(Self::with_generator(Box::new(generator)))
    }

    pub fn with_generator(generator: Box<dyn ReportGenerator>) -> Self {
        Self { generator }
    }

    pub fn generate(&self, image: &Path) -> Result<GeneratedReport> {
        tracing::info!("Generating report for '{}'", image.display());
        self.generator.generate(image)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGenerator;

    impl ReportGenerator for FixedGenerator {
        fn generate(&self, _image: &Path) -> Result<GeneratedReport> {
            Ok(GeneratedReport {
                findings:   vec![("normal".to_string(), 0.8)],
                impression: "no acute disease".to_string(),
            })
        }
    }

    #[test]
    fn test_delegates_to_generator() {
        let uc = GenerateUseCase::with_generator(Box::new(FixedGenerator));
        let report = uc.generate(Path::new("any.png")).unwrap();
        assert_eq!(report.impression, "no acute disease");
        assert_eq!(report.findings[0].0, "normal");
    }

    #[test]
    fn test_missing_outdir_artifacts_fail() {
        let dir = tempfile::tempdir().unwrap();
        let outdir = dir.path().to_string_lossy().to_string();
        assert!(GenerateUseCase::new(&outdir, 0.1, 0.0, 0).is_err());
    }
}
