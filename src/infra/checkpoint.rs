// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights as half-precision named msgpack,
// gzip-compressed (`.mpk.gz`).
//
// Output directory layout:
//   <outdir>/
//     encoder.mpk.gz     ← encoder weights of the best epoch
//     decoder.mpk.gz     ← decoder weights of the best epoch
//     train_config.json  ← hyper-parameters used to build the model
//     labels.json        ← problem classes, in multi-hot column order
//
// Encoder and decoder are trained as one module but recorded as two
// files, so an encoder can be reused on its own (see --pretrained).
//
// The config and the label set are needed to rebuild the exact
// architecture before the weights can be loaded into it.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{HalfPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::data::dataset::LabelSet;
use crate::ml::decoder::DecoderRnn;
use crate::ml::encoder::EncoderCnn;
use crate::ml::model::ReportModel;

const ENCODER_FILE: &str = "encoder";
const DECODER_FILE: &str = "decoder";
const RECORD_EXT: &str = ".mpk.gz";

type WeightRecorder = NamedMpkGzFileRecorder<HalfPrecisionSettings>;
const CONFIG_FILE: &str = "train_config.json";
const LABELS_FILE: &str = "labels.json";

/// Manages saving and loading of the artifacts in one output directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Overwrite both weight files with the current parameters.
    pub fn save_weights<B: Backend>(&self, model: &ReportModel<B>) -> Result<()> {
        let recorder = WeightRecorder::new();

        let path = self.dir.join(ENCODER_FILE);
        recorder
            .record(model.encoder.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save encoder to '{}'", path.display()))?;

        let path = self.dir.join(DECODER_FILE);
        recorder
            .record(model.decoder.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save decoder to '{}'", path.display()))?;

        tracing::debug!("Saved weights to '{}'", self.dir.display());
        Ok(())
    }

    pub fn has_weights(&self) -> bool {
        [ENCODER_FILE, DECODER_FILE]
            .iter()
            .all(|name| self.dir.join(format!("{name}{RECORD_EXT}")).exists())
    }

    /// Restore both halves of `model` from this directory.
    pub fn load_weights<B: Backend>(
        &self,
        model:  ReportModel<B>,
        device: &B::Device,
    ) -> Result<ReportModel<B>> {
        let encoder = self.load_encoder(model.encoder, device)?;
        let decoder = self.load_decoder(model.decoder, device)?;
        Ok(ReportModel { encoder, decoder })
    }

    pub fn load_decoder<B: Backend>(
        &self,
        decoder: DecoderRnn<B>,
        device:  &B::Device,
    ) -> Result<DecoderRnn<B>> {
        let path = self.dir.join(DECODER_FILE);
        let record = WeightRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load decoder '{}'. Have you trained the model first?", path.display())
            })?;
        Ok(decoder.load_record(record))
    }

    pub fn load_encoder<B: Backend>(
        &self,
        encoder: EncoderCnn<B>,
        device:  &B::Device,
    ) -> Result<EncoderCnn<B>> {
        load_encoder_from(encoder, &self.dir.join(ENCODER_FILE), device)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(CONFIG_FILE)
    }

    pub fn save_labels(&self, labels: &LabelSet) -> Result<()> {
        self.write_json(LABELS_FILE, labels)
    }

    pub fn load_labels(&self) -> Result<LabelSet> {
        self.read_json(LABELS_FILE)
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read '{}'. Make sure you have run 'train' with this --outdir.",
                path.display()
            )
        })?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }
}

/// Load encoder weights from an arbitrary record path, with or without
/// the `.mpk.gz` suffix.
pub fn load_encoder_from<B: Backend>(
    encoder: EncoderCnn<B>,
    path:    &Path,
    device:  &B::Device,
) -> Result<EncoderCnn<B>> {
    let stem = record_stem(path);
    let record = WeightRecorder::new()
        .load(stem.clone(), device)
        .with_context(|| format!("Cannot load encoder weights '{}{RECORD_EXT}'", stem.display()))?;
    Ok(encoder.load_record(record))
}

/// The recorder appends its own extension, so strip one if present.
fn record_stem(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_suffix(RECORD_EXT) {
        Some(stem) => PathBuf::from(stem),
        None => path.to_path_buf(),
    }
}
