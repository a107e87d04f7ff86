// ============================================================
// Layer 4 — Label / Context Mappings and Class Statistics
// ============================================================
// The model works with dense integer ids; the dataset has raw
// labels (star ratings, strings turned into numbers) and raw
// user/item names. These maps are built on the training split
// and saved with the checkpoint so inference uses the same ids.
//
//   LabelMap    raw label → class id 0..k (sorted by raw value)
//   ContextMap  raw name  → id 1..n, anything unseen → 0
//   ClassStats  per-class counts and proportions; the weighted
//               loss uses 1 - proportion as the class weight

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::document::RawReview;

// ─── LabelMap ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMap {
    labels: Vec<i64>,
}

impl LabelMap {
    pub fn build(labels: impl IntoIterator<Item = i64>) -> Self {
        let set: BTreeSet<i64> = labels.into_iter().collect();
        Self { labels: set.into_iter().collect() }
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn class_of(&self, label: i64) -> Option<usize> {
        self.labels.binary_search(&label).ok()
    }

    pub fn label_of(&self, class: usize) -> Option<i64> {
        self.labels.get(class).copied()
    }
}

// ─── ContextMap ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMap {
    ids: HashMap<String, usize>,
}

impl ContextMap {
    /// Assign ids from 1 in first-seen order; 0 stays reserved.
    pub fn build<'a>(names: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let mut ids = HashMap::new();
        for name in names.into_iter().flatten() {
            let next = ids.len() + 1;
            ids.entry(name.to_string()).or_insert(next);
        }
        Self { ids }
    }

    pub fn id_of(&self, name: Option<&str>) -> usize {
        name.and_then(|n| self.ids.get(n).copied()).unwrap_or(0)
    }

    /// Embedding table size, including the reserved 0 row.
    pub fn table_size(&self) -> usize {
        self.ids.len() + 1
    }
}

// ─── ClassStats ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    pub counts: BTreeMap<usize, usize>,
    pub total:  usize,
}

impl ClassStats {
    pub fn from_classes(classes: impl IntoIterator<Item = usize>) -> Self {
        let mut counts = BTreeMap::new();
        let mut total  = 0usize;
        for c in classes {
            *counts.entry(c).or_insert(0) += 1;
            total += 1;
        }
        Self { counts, total }
    }

    pub fn proportion(&self, class: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts.get(&class).copied().unwrap_or(0) as f64 / self.total as f64
    }

    /// `1 - p(class)` for every class id in `0..num_classes`.
    pub fn class_weights(&self, num_classes: usize) -> Vec<f32> {
        (0..num_classes)
            .map(|c| (1.0 - self.proportion(c)) as f32)
            .collect()
    }
}

// ─── ModelMaps ────────────────────────────────────────────────────────────────
/// The three id maps a trained model depends on; saved as one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMaps {
    pub labels: LabelMap,
    pub users:  ContextMap,
    pub items:  ContextMap,
}

impl ModelMaps {
    /// Build every map from the training split.
    pub fn from_training(reviews: &[RawReview]) -> Self {
        Self {
            labels: LabelMap::build(reviews.iter().map(|r| r.label)),
            users:  ContextMap::build(reviews.iter().map(|r| r.user.as_deref())),
            items:  ContextMap::build(reviews.iter().map(|r| r.item.as_deref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_map_is_sorted_and_dense() {
        let m = LabelMap::build([5, 1, 3, 5, 1]);
        assert_eq!(m.num_classes(), 3);
        assert_eq!(m.class_of(1), Some(0));
        assert_eq!(m.class_of(5), Some(2));
        assert_eq!(m.class_of(4), None);
        assert_eq!(m.label_of(1), Some(3));
    }

    #[test]
    fn test_context_map_reserves_zero() {
        let m = ContextMap::build([Some("alice"), None, Some("bob"), Some("alice")]);
        assert_eq!(m.id_of(Some("alice")), 1);
        assert_eq!(m.id_of(Some("bob")), 2);
        assert_eq!(m.id_of(Some("carol")), 0);
        assert_eq!(m.id_of(None), 0);
        assert_eq!(m.table_size(), 3);
    }

    #[test]
    fn test_class_weights_favour_rare_classes() {
        let s = ClassStats::from_classes([0, 0, 0, 1]);
        assert_eq!(s.total, 4);
        let w = s.class_weights(3);
        assert!((w[0] - 0.25).abs() < 1e-6);
        assert!((w[1] - 0.75).abs() < 1e-6);
        assert!((w[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_model_maps_from_training_split() {
        let reviews = vec![
            RawReview::new("a", 4).with_context("u1", "i1"),
            RawReview::new("b", 2).with_context("u2", "i1"),
        ];
        let maps = ModelMaps::from_training(&reviews);
        assert_eq!(maps.labels.num_classes(), 2);
        assert_eq!(maps.users.table_size(), 3);
        assert_eq!(maps.items.table_size(), 2);
    }
}
