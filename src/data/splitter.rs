// ============================================================
// Layer 4 — Train / Validation / Test Splitter
// ============================================================
// Two ways of splitting a corpus:
//
//   split_by_fold    — reviews carry a `fold` number; the chosen
//                      fold becomes the test set, everything else
//                      trains. An optional validation slice is
//                      carved from the END of the training set.
//
//   split_train_val  — no folds available: shuffle, then cut at
//                      `train_fraction`.
//
// Validation size is either a fraction in (0, 1) of the training
// set or an absolute count (>= 1).

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::document::RawReview;

/// The three parts of a split; `validation` is empty when not requested.
#[derive(Debug, Default)]
pub struct Split {
    pub train:      Vec<RawReview>,
    pub validation: Vec<RawReview>,
    pub test:       Vec<RawReview>,
}

/// Assign reviews to train/test by fold, then carve validation.
pub fn split_by_fold(reviews: Vec<RawReview>, test_fold: usize, validation: f64) -> Split {
    let (test, train): (Vec<_>, Vec<_>) = reviews
        .into_iter()
        .partition(|r| r.fold == Some(test_fold));

    let (train, validation) = carve_validation(train, validation);

    tracing::debug!(
        "Fold #{} split: {} train, {} validation, {} test",
        test_fold,
        train.len(),
        validation.len(),
        test.len()
    );
    Split { train, validation, test }
}

/// Remove the last `validation` items from `train` and return them.
pub fn carve_validation<T>(mut train: Vec<T>, validation: f64) -> (Vec<T>, Vec<T>) {
    let count = if validation <= 0.0 {
        0
    } else if validation < 1.0 {
        (validation * train.len() as f64) as usize
    } else {
        validation as usize
    };
    let split_at = train.len().saturating_sub(count);
    let val      = train.split_off(split_at);
    (train, val)
}

/// Shuffle with a fixed seed and split into (train, held-out).
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);
    let held_out = samples.split_off(split_at);

    tracing::debug!(
        "Random split: {} train, {} held out",
        samples.len(),
        held_out.len(),
    );
    (samples, held_out)
}

/// Folds present in the corpus, sorted.
pub fn available_folds(reviews: &[RawReview]) -> Vec<usize> {
    let mut folds: Vec<usize> = reviews.iter().filter_map(|r| r.fold).collect();
    folds.sort_unstable();
    folds.dedup();
    folds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<RawReview> {
        (0..10)
            .map(|i| RawReview::new(format!("r{i}"), 1).with_fold(i % 2))
            .collect()
    }

    #[test]
    fn test_fold_becomes_test_set() {
        let s = split_by_fold(corpus(), 1, 0.0);
        assert_eq!(s.test.len(), 5);
        assert!(s.test.iter().all(|r| r.fold == Some(1)));
        assert_eq!(s.train.len(), 5);
        assert!(s.validation.is_empty());
    }

    #[test]
    fn test_validation_fraction_comes_from_the_tail() {
        let s = split_by_fold(corpus(), 1, 0.4);
        assert_eq!(s.train.len(), 3);
        assert_eq!(s.validation.len(), 2);
        assert_eq!(s.validation[1].text, "r8");
    }

    #[test]
    fn test_validation_absolute_count() {
        let (train, val) = carve_validation((0..10).collect::<Vec<_>>(), 3.0);
        assert_eq!(train, (0..7).collect::<Vec<_>>());
        assert_eq!(val, vec![7, 8, 9]);
    }

    #[test]
    fn test_random_split_sizes_and_determinism() {
        let (a_train, a_val) = split_train_val((0..100).collect::<Vec<_>>(), 0.8, 7);
        let (b_train, _)     = split_train_val((0..100).collect::<Vec<_>>(), 0.8, 7);
        assert_eq!(a_train.len(), 80);
        assert_eq!(a_val.len(), 20);
        assert_eq!(a_train, b_train);
    }

    #[test]
    fn test_available_folds() {
        assert_eq!(available_folds(&corpus()), vec![0, 1]);
    }
}
