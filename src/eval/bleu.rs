//! Sentence-level BLEU-1.
//!
//! `BLEU-1 = BP × p1` where `p1` is the clipped unigram precision and
//! `BP` the brevity penalty:
//!
//! ```text
//! p1 = Σ_w min(count_cand(w), count_ref(w)) / |cand|
//! BP = 1                  if |cand| > |ref|
//!      exp(1 - |ref|/|cand|) otherwise
//! ```
//!
//! An empty candidate, or one sharing no word with the reference, scores 0.

use std::collections::HashMap;

pub fn bleu1<S: AsRef<str>>(reference: &[S], candidate: &[S]) -> f64 {
    if candidate.is_empty() {
        return 0.0;
    }

    let mut ref_counts: HashMap<&str, usize> = HashMap::new();
    for w in reference {
        *ref_counts.entry(w.as_ref()).or_insert(0) += 1;
    }

    let mut cand_counts: HashMap<&str, usize> = HashMap::new();
    for w in candidate {
        *cand_counts.entry(w.as_ref()).or_insert(0) += 1;
    }

    let clipped: usize = cand_counts
        .iter()
        .map(|(w, &n)| n.min(ref_counts.get(w).copied().unwrap_or(0)))
        .sum();
    if clipped == 0 {
        return 0.0;
    }

    let c  = candidate.len() as f64;
    let r  = reference.len() as f64;
    let p1 = clipped as f64 / c;
    let bp = if c > r { 1.0 } else { (1.0 - r / c).exp() };

    bp * p1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<&str> {
        s.split_whitespace().collect()
    }

    #[test]
    fn test_identical_sentences_score_one() {
        let s = words("no acute cardiopulmonary disease .");
        assert!((bleu1(&s, &s) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_clipping_limits_repeated_words() {
        // 7 candidate words, "the" clipped to 2 matches
        let reference = words("the cat is on the mat");
        let candidate = words("the the the the the the the");
        let expected = 2.0 / 7.0; // c > r so BP = 1
        assert!((bleu1(&reference, &candidate) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_brevity_penalty_for_short_candidate() {
        let reference = words("no acute disease of the chest");
        let candidate = words("no acute");
        let expected = (1.0f64 - 6.0 / 2.0).exp();
        assert!((bleu1(&reference, &candidate) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_no_overlap_or_empty_candidate_is_zero() {
        let reference = words("normal chest");
        assert_eq!(bleu1(&reference, &words("pleural effusion")), 0.0);
        assert_eq!(bleu1(&reference, &Vec::<&str>::new()), 0.0);
    }
}
