use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::data::image::{read_dimensions, resolve_image, ImageTransform};
use crate::domain::report::Report;
use crate::infra::tokenizer_store::CaptionTokenizer;

/// The ordered set of problem classes the encoder predicts.
/// Built once from the training split and shared, unmodified, with
/// every other consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    classes: Vec<String>,
}

impl LabelSet {
    pub fn from_reports(reports: &[Report]) -> Self {
        let classes: BTreeSet<&str> = reports
            .iter()
            .flat_map(|r| r.problems.iter().map(String::as_str))
            .collect();
        Self { classes: classes.into_iter().map(str::to_string).collect() }
    }

    pub fn len(&self) -> usize { self.classes.len() }

    pub fn is_empty(&self) -> bool { self.classes.is_empty() }

    pub fn classes(&self) -> &[String] { &self.classes }

    pub fn index_of(&self, class: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(class)).ok()
    }

    /// Multi-hot encode `problems`; classes not in the set are ignored.
    pub fn encode(&self, problems: &[String]) -> Vec<f32> {
        let mut v = vec![0.0; self.classes.len()];
        for p in problems {
            match self.index_of(p) {
                Some(i) => v[i] = 1.0,
                None => tracing::trace!("Ignoring unseen problem class '{}'", p),
            }
        }
        v
    }
}

/// One decoded sample: normalised CHW image, multi-hot labels and the
/// `<start> … <end>` caption token ids.
#[derive(Debug, Clone)]
pub struct XRayItem {
    pub uid:    String,
    pub image:  Vec<f32>,
    pub labels: Vec<f32>,
    pub tokens: Vec<u32>,
}

/// Everything about a sample except its pixels, which are decoded on `get`.
#[derive(Debug, Clone)]
struct XRayEntry {
    uid:        String,
    image_path: PathBuf,
    labels:     Vec<f32>,
    tokens:     Vec<u32>,
}

pub struct XRayDataset {
    entries:   Vec<XRayEntry>,
    transform: ImageTransform,
}

impl XRayDataset {
    /// Build a dataset from reports. Reports without an image file in
    /// `image_dir`, or whose file has no readable image header, are
    /// skipped with a warning.
    pub fn from_reports(
        reports:   &[Report],
        image_dir: &Path,
        labels:    &LabelSet,
        tokenizer: &CaptionTokenizer,
        transform: ImageTransform,
    ) -> anyhow::Result<Self> {
        let mut entries = Vec::with_capacity(reports.len());
        let mut missing    = 0usize;
        let mut unreadable = 0usize;

        for report in reports {
            let Some(image_path) = resolve_image(image_dir, &report.uid) else {
                tracing::warn!("No image for uid '{}' in '{}'", report.uid, image_dir.display());
                missing += 1;
                continue;
            };
            if let Err(e) = read_dimensions(&image_path) {
                tracing::warn!("Skipping uid '{}': {:#}", report.uid, e);
                unreadable += 1;
                continue;
            }
            entries.push(XRayEntry {
                uid:    report.uid.clone(),
                image_path,
                labels: labels.encode(&report.problems),
                tokens: tokenizer.encode_caption(&report.impression)?,
            });
        }

        if missing > 0 {
            tracing::warn!("Skipped {} of {} reports with missing images", missing, reports.len());
        }
        if unreadable > 0 {
            tracing::warn!("Skipped {} of {} reports with unreadable images", unreadable, reports.len());
        }
        Ok(Self { entries, transform })
    }

    pub fn sample_count(&self) -> usize { self.entries.len() }
}

// `get` returns None only past the end: the data loader stops at the
// first None. A file whose header passed the check but whose pixels
// fail to decode yields an all-zero (dataset-mean) image.
impl Dataset<XRayItem> for XRayDataset {
    fn get(&self, index: usize) -> Option<XRayItem> {
        let entry = self.entries.get(index)?;
        let image = self.transform.load(&entry.image_path).unwrap_or_else(|e| {
            tracing::error!("{:#}; using a blank image", e);
            vec![0.0; self.transform.output_len()]
        });
        Some(XRayItem {
            uid:    entry.uid.clone(),
            image,
            labels: entry.labels.clone(),
            tokens: entry.tokens.clone(),
        })
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(uid: &str, problems: &[&str], impression: &str) -> Report {
        Report::new(uid, problems.iter().map(|s| s.to_string()).collect(), "", impression)
    }

    #[test]
    fn test_label_set_is_sorted_and_unique() {
        let labels = LabelSet::from_reports(&[
            report("1", &["Opacity", "Cardiomegaly"], ""),
            report("2", &["Cardiomegaly", "normal"], ""),
        ]);
        assert_eq!(labels.classes(), &["Cardiomegaly", "Opacity", "normal"]);
        assert_eq!(labels.index_of("normal"), Some(2));
        assert_eq!(labels.index_of("Effusion"), None);
    }

    #[test]
    fn test_multi_hot_ignores_unknown_classes() {
        let labels = LabelSet::from_reports(&[report("1", &["a", "b", "c"], "")]);
        let v = labels.encode(&["c".to_string(), "zzz".to_string(), "a".to_string()]);
        assert_eq!(v, vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_dataset_skips_missing_images_and_loads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        image::GrayImage::from_pixel(8, 8, image::Luma([90]))
            .save(dir.path().join("A.png"))
            .unwrap();

        let reports = vec![
            report("A", &["normal"], "no acute disease."),
            report("B", &["Opacity"], "opacity."),
        ];
        let labels    = LabelSet::from_reports(&reports);
        let tokenizer = CaptionTokenizer::build(&reports, 1).unwrap();
        let ds = XRayDataset::from_reports(
            &reports, dir.path(), &labels, &tokenizer, ImageTransform::new(4),
        ).unwrap();

        assert_eq!(ds.len(), 1);
        let item = ds.get(0).unwrap();
        assert_eq!(item.uid, "A");
        assert_eq!(item.image.len(), 3 * 4 * 4);
        // Byte order: "Opacity" < "normal"
        assert_eq!(item.labels, vec![0.0, 1.0]);
        assert_eq!(item.tokens.first(), Some(&CaptionTokenizer::START_ID));
        assert_eq!(item.tokens.last(), Some(&CaptionTokenizer::END_ID));
        assert!(ds.get(1).is_none());
    }

    #[test]
    fn test_corrupt_image_is_skipped_and_loader_sees_every_sample() {
        use crate::data::batcher::{XRayBatch, XRayBatcher};
        use burn::backend::ndarray::NdArray;
        use burn::data::dataloader::DataLoaderBuilder;
        use std::sync::Arc;

        type TestBackend = NdArray<f32>;

        let dir = tempfile::tempdir().unwrap();
        let reports: Vec<Report> = (0..4)
            .map(|i| report(&format!("u{i}"), &["normal"], "heart size normal."))
            .collect();
        for i in [0, 2, 3] {
            image::GrayImage::from_pixel(8, 8, image::Luma([60]))
                .save(dir.path().join(format!("u{i}.png")))
                .unwrap();
        }
        std::fs::write(dir.path().join("u1.png"), b"\x00\x01 junk bytes").unwrap();

        let labels    = LabelSet::from_reports(&reports);
        let tokenizer = CaptionTokenizer::build(&reports, 1).unwrap();
        let ds = XRayDataset::from_reports(
            &reports, dir.path(), &labels, &tokenizer, ImageTransform::new(4),
        ).unwrap();

        assert_eq!(ds.len(), 3);
        assert!((0..3).all(|i| ds.get(i).is_some()));
        assert!(ds.get(3).is_none());

        let loader = DataLoaderBuilder::<TestBackend, XRayItem, XRayBatch<TestBackend>>::new(XRayBatcher::new())
            .batch_size(1)
            .build(Arc::new(ds));
        let uids: Vec<String> = loader.iter().flat_map(|b| b.uids).collect();
        assert_eq!(uids, vec!["u0", "u2", "u3"]);
    }
}
