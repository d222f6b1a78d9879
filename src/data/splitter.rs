// ============================================================
// Layer 4 — Train/Validation/Test Splitter
// ============================================================
// Partitions reports by uid into three disjoint sets:
//   - Training set:   updates model weights, defines vocab + labels
//   - Validation set: drives checkpoint selection
//   - Test set:       held out for the final evaluation
//
// Split ratio: 80% training, then the remaining 20% halved into
// validation and test. Held-out sizes are rounded UP, so for 25
// reports: train=20, then 5 → valid=2, test=3.
//
// The split is a pure function of (set of uids, seed):
//   1. Sort by uid so file order does not matter
//   2. Fisher-Yates shuffle with a seeded StdRng
//   3. Cut at the computed sizes
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::report::Report;

/// Fraction of all reports held out of training
const HOLDOUT_FRACTION: f64 = 0.2;
/// Fraction of the held-out reports that become the test set
const TEST_FRACTION_OF_HOLDOUT: f64 = 0.5;

/// The three disjoint partitions of the report corpus.
#[derive(Debug, Clone, Default)]
pub struct ReportSplits {
    pub train: Vec<Report>,
    pub valid: Vec<Report>,
    pub test:  Vec<Report>,
}

/// Shuffle `reports` deterministically and split into (train, valid, test).
pub fn split_reports(mut reports: Vec<Report>, seed: u64) -> ReportSplits {
    reports.sort_by(|a, b| a.uid.cmp(&b.uid));

    let mut rng = StdRng::seed_from_u64(seed);
    reports.shuffle(&mut rng);

    let total   = reports.len();
    let holdout = held_out_count(total, HOLDOUT_FRACTION);
    let test_n  = held_out_count(holdout, TEST_FRACTION_OF_HOLDOUT);

    // After these two calls: reports=[train], valid=[valid + test]
    let mut valid = reports.split_off(total - holdout);
    let test      = valid.split_off(holdout - test_n);

    tracing::debug!(
        "Report split (seed={}): {} train, {} valid, {} test",
        seed,
        reports.len(),
        valid.len(),
        test.len(),
    );

    ReportSplits { train: reports, valid, test }
}

/// ceil(n * fraction), clamped to n
fn held_out_count(n: usize, fraction: f64) -> usize {
    ((n as f64) * fraction).ceil().min(n as f64) as usize
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn reports(n: usize) -> Vec<Report> {
        (0..n)
            .map(|i| Report::new(format!("CXR{i}"), vec![], "", "text"))
            .collect()
    }

    fn uids(v: &[Report]) -> Vec<String> {
        v.iter().map(|r| r.uid.clone()).collect()
    }

    #[test]
    fn test_split_sizes_round_holdout_up() {
        let s = split_reports(reports(25), 1337);
        assert_eq!(s.train.len(), 20);
        assert_eq!(s.valid.len(), 2);
        assert_eq!(s.test.len(), 3);

        let s = split_reports(reports(100), 1337);
        assert_eq!((s.train.len(), s.valid.len(), s.test.len()), (80, 10, 10));
    }

    #[test]
    fn test_splits_are_disjoint_and_complete() {
        let s = split_reports(reports(57), 7);
        let mut all: HashSet<String> = HashSet::new();
        for r in s.train.iter().chain(&s.valid).chain(&s.test) {
            assert!(all.insert(r.uid.clone()), "uid {} appears twice", r.uid);
        }
        assert_eq!(all.len(), 57);
    }

    #[test]
    fn test_split_is_stable_regardless_of_input_order() {
        let a = split_reports(reports(40), 1337);
        let mut shuffled = reports(40);
        shuffled.reverse();
        let b = split_reports(shuffled, 1337);
        assert_eq!(uids(&a.train), uids(&b.train));
        assert_eq!(uids(&a.valid), uids(&b.valid));
        assert_eq!(uids(&a.test), uids(&b.test));
    }

    #[test]
    fn test_different_seed_changes_split() {
        let a = split_reports(reports(40), 1);
        let b = split_reports(reports(40), 2);
        assert_ne!(uids(&a.train), uids(&b.train));
    }

    #[test]
    fn test_empty_and_tiny_corpus() {
        let s = split_reports(Vec::new(), 1337);
        assert!(s.train.is_empty() && s.valid.is_empty() && s.test.is_empty());

        // 1 report: holdout = ceil(0.2) = 1, test = ceil(0.5) = 1
        let s = split_reports(reports(1), 1337);
        assert_eq!((s.train.len(), s.valid.len(), s.test.len()), (0, 0, 1));
    }
}
