// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Cleans report text before it reaches the tokenizer, and provides
// the word splitting shared by vocabulary building and BLEU scoring.
//
// Reports exported from clinical systems often contain:
//   - Non-breaking spaces (U+00A0) and zero-width spaces (U+200B)
//   - Carriage returns and tabs from the source document
//   - Runs of spaces from fixed-width layouts
//   - De-identification placeholders such as "XXXX"
//
// Cleaning steps (applied in order):
//   1. Map Unicode whitespace variants and control chars to space
//   2. Lowercase
//   3. Collapse every whitespace run (newlines included) to one space
//   4. Trim
//
// Reference: Rust Book §8 (Strings in Rust)
//            Rust Book §13 (Iterators)

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean raw report text for downstream tokenisation.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1 + 2: normalise individual characters ───────────────────────
        let normalised = text.chars().map(|c| match c {
            '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
            c if c.is_control() => ' ',
            c => c,
        });

        // ── Step 3: collapse whitespace runs ──────────────────────────────────
        let mut out        = String::with_capacity(text.len());
        let mut last_space = true;
        for c in normalised.flat_map(char::to_lowercase) {
            if c.is_whitespace() {
                if !last_space {
                    out.push(' ');
                }
                last_space = true;
            } else {
                out.push(c);
                last_space = false;
            }
        }

        // ── Step 4: trim ──────────────────────────────────────────────────────
        out.truncate(out.trim_end().len());
        out
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Split text into word runs (alphanumeric or `_`) and punctuation runs,
/// dropping whitespace: `"no acute, disease."` → `["no", "acute", ",", "disease", "."]`.
///
/// This is the same split the tokenizer's `Whitespace` pre-tokenizer performs
/// (`\w+|[^\w\s]+`), so a vocabulary counted with it matches what the
/// tokenizer sees at encode time.
pub fn word_pieces(text: &str) -> Vec<&str> {
    #[derive(PartialEq, Clone, Copy)]
    enum Class {
        Word,
        Punct,
        Space,
    }

    fn class_of(c: char) -> Class {
        if c.is_alphanumeric() || c == '_' {
            Class::Word
        } else if c.is_whitespace() {
            Class::Space
        } else {
            Class::Punct
        }
    }

    let mut pieces = Vec::new();
    let mut start: Option<(usize, Class)> = None;

    for (i, c) in text.char_indices() {
        let class = class_of(c);
        match start {
            Some((_, current)) if current == class => {}
            Some((s, current)) => {
                if current != Class::Space {
                    pieces.push(&text[s..i]);
                }
                start = Some((i, class));
            }
            None => start = Some((i, class)),
        }
    }
    if let Some((s, class)) = start {
        if class != Class::Space {
            pieces.push(&text[s..]);
        }
    }

    pieces
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_whitespace_and_lowercases() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  No   acute\n\n Cardiopulmonary\tDisease. "), "no acute cardiopulmonary disease.");
    }

    #[test]
    fn test_removes_control_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("heart\x01size\u{00A0}normal"), "heart size normal");
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(""), "");
        assert_eq!(p.clean(" \n "), "");
    }

    #[test]
    fn test_word_pieces_splits_punctuation() {
        assert_eq!(
            word_pieces("no acute, disease."),
            vec!["no", "acute", ",", "disease", "."]
        );
    }

    #[test]
    fn test_word_pieces_keeps_punctuation_runs_together() {
        assert_eq!(word_pieces("t10-t11..."), vec!["t10", "-", "t11", "..."]);
        assert!(word_pieces("   ").is_empty());
    }
}
