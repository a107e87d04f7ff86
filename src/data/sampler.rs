// ============================================================
// Layer 4 — Class-Balanced Sampling
// ============================================================
// Review corpora are heavily skewed (most reviews are 5 stars).
// BalancedDataset is a view over another dataset that draws a
// class uniformly at random, then a document of that class
// uniformly at random. Its length is the size of the smallest
// class bucket, so one "epoch" over it is short but balanced.
//
// Class buckets are computed once per training split from the
// labels alone. Each epoch builds a new view over them with its own
// seed; the draw order is fixed at construction, which keeps
// Dataset::get deterministic for a given view.

use burn::data::dataset::Dataset;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;

use crate::domain::document::TokenizedDocument;

/// Document indices grouped by class, classes in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassBuckets(Vec<Vec<usize>>);

impl ClassBuckets {
    pub fn from_labels(labels: impl IntoIterator<Item = usize>) -> Self {
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, label) in labels.into_iter().enumerate() {
            by_class.entry(label).or_default().push(index);
        }
        Self(by_class.into_values().collect())
    }

    /// Length of one balanced epoch.
    pub fn smallest(&self) -> usize {
        self.0.iter().map(Vec::len).min().unwrap_or(0)
    }
}

pub struct BalancedDataset<D> {
    inner: D,
    draws: Vec<usize>,
}

impl<D: Dataset<TokenizedDocument>> BalancedDataset<D> {
    pub fn new(inner: D, buckets: &ClassBuckets, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let draws = (0..buckets.smallest())
            .map(|_| {
                let bucket = &buckets.0[rng.gen_range(0..buckets.0.len())];
                bucket[rng.gen_range(0..bucket.len())]
            })
            .collect();
        Self { inner, draws }
    }
}

impl<D: Dataset<TokenizedDocument>> Dataset<TokenizedDocument> for BalancedDataset<D> {
    fn get(&self, index: usize) -> Option<TokenizedDocument> {
        self.draws.get(index).and_then(|&i| self.inner.get(i))
    }

    fn len(&self) -> usize {
        self.draws.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ReviewDataset;

    fn skewed() -> ReviewDataset {
        let mut docs: Vec<TokenizedDocument> =
            (0..20).map(|_| TokenizedDocument::new(vec![vec![2]], 0)).collect();
        docs.extend((0..3).map(|_| TokenizedDocument::new(vec![vec![3]], 1)));
        ReviewDataset::new(docs)
    }

    fn view(data: ReviewDataset, seed: u64) -> BalancedDataset<ReviewDataset> {
        let buckets = ClassBuckets::from_labels(data.labels());
        BalancedDataset::new(data, &buckets, seed)
    }

    #[test]
    fn test_buckets_group_indices_by_class() {
        let buckets = ClassBuckets::from_labels([2, 0, 2, 1, 0, 2]);
        assert_eq!(buckets, ClassBuckets(vec![vec![1, 4], vec![3], vec![0, 2, 5]]));
        assert_eq!(buckets.smallest(), 1);
    }

    #[test]
    fn test_length_is_smallest_bucket() {
        assert_eq!(view(skewed(), 1).len(), 3);
    }

    #[test]
    fn test_same_seed_same_draws() {
        let a = view(skewed(), 42);
        let b = view(skewed(), 42);
        let la: Vec<_> = (0..a.len()).map(|i| a.get(i).unwrap().label).collect();
        let lb: Vec<_> = (0..b.len()).map(|i| b.get(i).unwrap().label).collect();
        assert_eq!(la, lb);
    }

    #[test]
    fn test_one_set_of_buckets_serves_every_epoch() {
        let data    = skewed();
        let buckets = ClassBuckets::from_labels(data.labels());
        for seed in 0..4 {
            let epoch = BalancedDataset::new(data.clone(), &buckets, seed);
            assert_eq!(epoch.len(), 3);
            assert!((0..epoch.len()).all(|i| epoch.get(i).is_some()));
        }
    }

    #[test]
    fn test_empty_dataset_gives_empty_view() {
        let v = view(ReviewDataset::new(Vec::new()), 0);
        assert_eq!(v.len(), 0);
        assert!(v.get(0).is_none());
    }
}
