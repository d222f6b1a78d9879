// ============================================================
// Layer 3 — Report Domain Type
// ============================================================
// A single chest X-ray report as it appears in the source CSV:
//   - uid        → identifies the image file on disk
//   - problems   → the clinical findings, used as multi-label targets
//   - findings   → free-text findings section (kept, not modelled)
//   - impression → free-text summary the decoder learns to write
//
// Reference: Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

/// A raw report before any tokenisation or label encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub uid:        String,
    pub problems:   Vec<String>,
    pub findings:   String,
    pub impression: String,
}

impl Report {
    pub fn new(
        uid:        impl Into<String>,
        problems:   Vec<String>,
        findings:   impl Into<String>,
        impression: impl Into<String>,
    ) -> Self {
        Self {
            uid:        uid.into(),
            problems,
            findings:   findings.into(),
            impression: impression.into(),
        }
    }

    /// True when the report carries no usable impression text
    pub fn has_impression(&self) -> bool {
        !self.impression.trim().is_empty()
    }
}

/// Output of running the trained model on one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReport {
    /// Predicted problems with their sigmoid probability,
    /// sorted by probability (highest first)
    pub findings:   Vec<(String, f32)>,
    /// Decoded impression text
    pub impression: String,
}
