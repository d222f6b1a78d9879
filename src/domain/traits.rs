// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer is written against these traits:
//   - CsvReportLoader implements ReportSource
//   - Generator       implements ReportGenerator
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

use crate::domain::report::{GeneratedReport, Report};

// ─── ReportSource ─────────────────────────────────────────────────────────────
/// Any component that can load the full report corpus.
pub trait ReportSource {
    /// Load every report available from this source.
    fn load_all(&self) -> Result<Vec<Report>>;
}

// ─── ReportGenerator ──────────────────────────────────────────────────────────
/// Any component that can turn an X-ray image into a report.
pub trait ReportGenerator {
    /// Predict findings and write an impression for the image at `image`.
    fn generate(&self, image: &Path) -> Result<GeneratedReport>;
}
