// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the caption vocabulary.
//
// The vocabulary is a word-level tokenizer counted over the
// training impressions. It is written as a tokenizer JSON in the
// HuggingFace format and loaded back through `tokenizers`, so the
// exact same file drives training, evaluation and generation.
//
// Special tokens have fixed ids:
//   <pad>   = 0   padding in batches
//   <start> = 1   first decoder target, never generated
//   <end>   = 2   end of caption
//   <unk>   = 3   out-of-vocabulary word
//
// Reference: tokenizers crate documentation (WordLevel model)

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokenizers::Tokenizer;

use crate::data::preprocessor::{word_pieces, Preprocessor};
use crate::domain::report::Report;

const TOKENIZER_FILE: &str = "tokenizer.json";

/// A word-level tokenizer with caption framing helpers.
#[derive(Clone)]
pub struct CaptionTokenizer {
    inner: Tokenizer,
}

impl CaptionTokenizer {
    pub const PAD_ID:   u32 = 0;
    pub const START_ID: u32 = 1;
    pub const END_ID:   u32 = 2;
    pub const UNK_ID:   u32 = 3;

    const SPECIALS: [&'static str; 4] = ["<pad>", "<start>", "<end>", "<unk>"];

    /// Count words over the cleaned impressions of `reports` and keep
    /// those occurring at least `min_freq` times.
    pub fn build(reports: &[Report], min_freq: usize) -> Result<Self> {
        let prep = Preprocessor::new();
        let mut freq: HashMap<String, usize> = HashMap::new();

        for report in reports {
            let text = prep.clean(&report.impression);
            for piece in word_pieces(&text) {
                *freq.entry(piece.to_string()).or_insert(0) += 1;
            }
        }

        // Frequency descending, then alphabetical, so ids are reproducible
        let mut words: Vec<(String, usize)> = freq
            .into_iter()
            .filter(|(_, n)| *n >= min_freq.max(1))
            .collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut vocab = serde_json::Map::new();
        for (id, tok) in Self::SPECIALS.iter().enumerate() {
            vocab.insert(tok.to_string(), serde_json::json!(id));
        }
        for (word, _) in &words {
            if !vocab.contains_key(word) {
                let id = vocab.len();
                vocab.insert(word.clone(), serde_json::json!(id));
            }
        }

        let added_tokens: Vec<serde_json::Value> = Self::SPECIALS
            .iter()
            .enumerate()
            .map(|(id, tok)| serde_json::json!({
                "id": id, "content": tok, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added_tokens,
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": true
            },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "<unk>"
            }
        });

        let inner = Tokenizer::from_str(&tokenizer_json.to_string())
            .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))?;

        tracing::info!(
            "Tokenizer built: {} words + {} special tokens",
            words.len(),
            Self::SPECIALS.len()
        );
        Ok(Self { inner })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))?;
        Ok(Self { inner })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.inner
            .save(path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {}", path.display(), e))
    }

    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// `<start> w1 … wn <end>` for one impression.
    pub fn encode_caption(&self, text: &str) -> Result<Vec<u32>> {
        let clean = Preprocessor::new().clean(text);
        let enc = self
            .inner
            .encode(clean.as_str(), false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut ids = Vec::with_capacity(enc.len() + 2);
        ids.push(Self::START_ID);
        ids.extend_from_slice(enc.get_ids());
        ids.push(Self::END_ID);
        Ok(ids)
    }

    /// Strip a leading `<start>`, stop at the first `<end>`, drop padding.
    pub fn caption_body(ids: &[u32]) -> Vec<u32> {
        let ids = ids.strip_prefix(&[Self::START_ID]).unwrap_or(ids);
        ids.iter()
            .copied()
            .take_while(|&id| id != Self::END_ID)
            .filter(|&id| id != Self::PAD_ID && id != Self::START_ID)
            .collect()
    }

    /// Decode a generated or reference id sequence into text.
    pub fn decode_caption(&self, ids: &[u32]) -> Result<String> {
        let body = Self::caption_body(ids);
        let text = self
            .inner
            .decode(&body, true)
            .map_err(|e| anyhow::anyhow!("Decode error: {e}"))?;
        Ok(text.trim().to_string())
    }
}

/// Persists the tokenizer next to the checkpoints.
pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Build a fresh tokenizer from the training reports and save it,
    /// replacing any tokenizer left by an earlier run.
    pub fn build_and_save(&self, reports: &[Report], min_freq: usize) -> Result<CaptionTokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let tokenizer = CaptionTokenizer::build(reports, min_freq)?;
        tokenizer.save(&self.path())?;
        tracing::debug!("Saved tokenizer to '{}'", self.path().display());
        Ok(tokenizer)
    }

    /// Load the tokenizer saved by a training run.
    pub fn load(&self) -> Result<CaptionTokenizer> {
        let path = self.path();
        if !path.exists() {
            anyhow::bail!(
                "Cannot find '{}'. Run training before evaluating or generating.",
                path.display()
            );
        }
        CaptionTokenizer::from_file(&path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn reports() -> Vec<Report> {
        vec![
            Report::new("1", vec![], "", "No acute disease."),
            Report::new("2", vec![], "", "No  acute cardiopulmonary abnormality."),
        ]
    }

    #[test]
    fn test_encode_frames_caption() {
        let tok = CaptionTokenizer::build(&reports(), 1).unwrap();
        let ids = tok.encode_caption("no acute disease.").unwrap();
        assert_eq!(ids.len(), 6); // <start> no acute disease . <end>
        assert_eq!(ids[0], CaptionTokenizer::START_ID);
        assert_eq!(*ids.last().unwrap(), CaptionTokenizer::END_ID);
        assert!(!ids.contains(&CaptionTokenizer::UNK_ID));
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tok = CaptionTokenizer::build(&reports(), 1).unwrap();
        let ids = tok.encode_caption("pneumothorax").unwrap();
        assert_eq!(ids, vec![1, CaptionTokenizer::UNK_ID, 2]);
    }

    #[test]
    fn test_min_freq_filters_rare_words() {
        // "no", "acute" and "." occur twice; everything else once
        let tok = CaptionTokenizer::build(&reports(), 2).unwrap();
        assert_eq!(tok.vocab_size(), 4 + 3);
    }

    #[test]
    fn test_decode_round_trips_text() {
        let tok = CaptionTokenizer::build(&reports(), 1).unwrap();
        let mut ids = tok.encode_caption("No acute disease").unwrap();
        ids.extend([0, 0]);
        assert_eq!(tok.decode_caption(&ids).unwrap(), "no acute disease");
    }

    #[test]
    fn test_caption_body_cuts_at_end() {
        assert_eq!(CaptionTokenizer::caption_body(&[1, 7, 8, 2, 9, 0]), vec![7, 8]);
        assert_eq!(CaptionTokenizer::caption_body(&[7, 0, 8]), vec![7, 8]);
        assert!(CaptionTokenizer::caption_body(&[1, 2]).is_empty());
    }

    #[test]
    fn test_store_save_and_load() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        assert!(store.load().is_err());

        let built  = store.build_and_save(&reports(), 1).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(built.vocab_size(), loaded.vocab_size());
        assert_eq!(
            built.encode_caption("no acute disease").unwrap(),
            loaded.encode_caption("no acute disease").unwrap()
        );
    }
}
