// ============================================================
// Layer 5 — Resequencer
// ============================================================
// Bridges the two encoder levels. The word encoder returns one
// vector per sentence in sentence-length order; the sentence
// encoder needs one padded row per document, sentences in their
// original order, documents sorted by sentence count.
//
// Everything is derived from the BatchStat list:
//
//   stats (row: doc, sent)     A=0 has 2, B=1 has 1, C=2 has 3
//     0: C,2   1: A,1   2: B,0   3: A,0   4: C,0   5: C,1
//
//   document_order = [C, A, B]      new position → document
//   real_order     = [1, 2, 0]      document → new position
//
//   gather (pad = 6, the appended zero row)
//     C: [4, 5, 0]
//     A: [3, 1, 6]
//     B: [2, 6, 6]
//
// `restore` applies real_order to bring sentence-level results
// back into the caller's document order.

use burn::prelude::*;

use crate::domain::batch_stat::{BatchStat, Permutation};
use crate::ml::error::ModelError;

/// Index plan for one batch. Rebuilt in place for every batch so
/// its buffers are reused.
#[derive(Debug, Default, Clone)]
pub struct ResequencePlan {
    /// Row index per (document slot, sentence slot); `rows` marks padding.
    gather:         Vec<i32>,
    /// Sentence count per document slot, non-increasing.
    lengths:        Vec<usize>,
    counts:         Vec<usize>,
    max_lr:         usize,
    rows:           usize,
    document_order: Permutation,
    real_order:     Permutation,
}

impl ResequencePlan {
    pub fn from_stats(stats: &[BatchStat], num_docs: usize) -> Result<Self, ModelError> {
        let mut plan = Self::default();
        plan.rebuild(stats, num_docs)?;
        Ok(plan)
    }

    /// Recompute the plan for a new batch, overwriting every buffer.
    pub fn rebuild(&mut self, stats: &[BatchStat], num_docs: usize) -> Result<(), ModelError> {
        if num_docs == 0 {
            return Err(ModelError::EmptyBatch);
        }

        self.counts.clear();
        self.counts.resize(num_docs, 0);
        for (row, stat) in stats.iter().enumerate() {
            if stat.doc_index >= num_docs {
                return Err(ModelError::UnknownDocument { row, doc_index: stat.doc_index, num_docs });
            }
            self.counts[stat.doc_index] += 1;
        }
        if let Some(doc_index) = self.counts.iter().position(|&c| c == 0) {
            return Err(ModelError::MissingDocument { doc_index });
        }

        let mut order: Vec<usize> = (0..num_docs).collect();
        order.sort_by(|&a, &b| self.counts[b].cmp(&self.counts[a]).then(a.cmp(&b)));

        let document_order = Permutation::new(order)
            .ok_or_else(|| ModelError::Data("document order is not a permutation".into()))?;
        let real_order = document_order.inverse();
        debug_assert!(document_order.is_inverse_of(&real_order));

        self.rows   = stats.len();
        self.max_lr = self.counts[document_order.as_slice()[0]];

        self.lengths.clear();
        self.lengths.extend(document_order.as_slice().iter().map(|&d| self.counts[d]));

        let pad = self.rows as i32;
        self.gather.clear();
        self.gather.resize(num_docs * self.max_lr, pad);
        for (row, stat) in stats.iter().enumerate() {
            let count = self.counts[stat.doc_index];
            if stat.lr != count {
                return Err(ModelError::Data(format!(
                    "row {row} says document {} has {} sentences, but the batch holds {count}",
                    stat.doc_index, stat.lr
                )));
            }
            if stat.sent_index >= count {
                return Err(ModelError::Data(format!(
                    "row {row} claims sentence {} of document {}, which has {count} rows",
                    stat.sent_index, stat.doc_index
                )));
            }
            let slot = real_order.as_slice()[stat.doc_index] * self.max_lr + stat.sent_index;
            if self.gather[slot] != pad {
                return Err(ModelError::Data(format!(
                    "sentence {} of document {} appears twice in the batch",
                    stat.sent_index, stat.doc_index
                )));
            }
            self.gather[slot] = row as i32;
        }

        self.document_order = document_order;
        self.real_order     = real_order;
        Ok(())
    }

    pub fn num_docs(&self) -> usize {
        self.lengths.len()
    }

    pub fn max_lr(&self) -> usize {
        self.max_lr
    }

    /// Sentence counts in document_order (non-increasing).
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn gather_index(&self) -> &[i32] {
        &self.gather
    }

    pub fn document_order(&self) -> &Permutation {
        &self.document_order
    }

    pub fn real_order(&self) -> &Permutation {
        &self.real_order
    }

    /// Sentence vectors [rows, D] in word-batch order → [num_docs, max_lr, D]
    /// in document_order, zero-padded.
    pub fn apply<B: Backend>(&self, sentences: Tensor<B, 2>) -> Result<Tensor<B, 3>, ModelError> {
        let [rows, width] = sentences.dims();
        if rows != self.rows {
            return Err(ModelError::Shape {
                what:     "sentence vectors",
                expected: vec![self.rows, width],
                actual:   vec![rows, width],
            });
        }
        let device = sentences.device();

        let padded = Tensor::cat(vec![sentences, Tensor::zeros([1, width], &device)], 0);
        let index  = Tensor::<B, 1, Int>::from_ints(self.gather.as_slice(), &device);

        Ok(padded
            .select(0, index)
            .reshape([self.num_docs(), self.max_lr, width]))
    }

    /// Rows in caller order → rows in document_order.
    pub fn reorder<B: Backend, const D: usize>(&self, t: Tensor<B, D>) -> Tensor<B, D> {
        let index = self.document_order.to_i32();
        let device = t.device();
        t.select(0, Tensor::<B, 1, Int>::from_ints(index.as_slice(), &device))
    }

    /// Rows in document_order → rows in caller order.
    pub fn restore<B: Backend, const D: usize>(&self, t: Tensor<B, D>) -> Tensor<B, D> {
        let index = self.real_order.to_i32();
        let device = t.device();
        t.select(0, Tensor::<B, 1, Int>::from_ints(index.as_slice(), &device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    /// Rows of the three-document batch A=[3,5], B=[4], C=[2,2,6].
    fn scenario_stats() -> Vec<BatchStat> {
        vec![
            BatchStat::new(6, 3, 2, 2),
            BatchStat::new(5, 2, 0, 1),
            BatchStat::new(4, 1, 1, 0),
            BatchStat::new(3, 2, 0, 0),
            BatchStat::new(2, 3, 2, 0),
            BatchStat::new(2, 3, 2, 1),
        ]
    }

    #[test]
    fn test_plan_for_three_document_batch() {
        let plan = ResequencePlan::from_stats(&scenario_stats(), 3).unwrap();

        assert_eq!(plan.document_order().as_slice(), &[2, 0, 1]);
        assert_eq!(plan.real_order().as_slice(), &[1, 2, 0]);
        assert!(plan.document_order().is_inverse_of(plan.real_order()));
        assert_eq!(plan.lengths(), &[3, 2, 1]);
        assert_eq!(plan.max_lr(), 3);
        assert_eq!(plan.gather_index(), &[4, 5, 0, 3, 1, 6, 2, 6, 6]);
    }

    #[test]
    fn test_equal_counts_keep_document_index_order() {
        let stats = vec![BatchStat::new(4, 1, 1, 0), BatchStat::new(2, 1, 0, 0)];
        let plan  = ResequencePlan::from_stats(&stats, 2).unwrap();
        assert_eq!(plan.document_order().as_slice(), &[0, 1]);
        assert_eq!(plan.gather_index(), &[1, 0]);
    }

    #[test]
    fn test_rebuild_overwrites_previous_batch() {
        let mut plan = ResequencePlan::from_stats(&scenario_stats(), 3).unwrap();
        plan.rebuild(&[BatchStat::new(1, 1, 0, 0)], 1).unwrap();

        assert_eq!(plan.gather_index(), &[0]);
        assert_eq!(plan.lengths(), &[1]);
        assert_eq!(plan.document_order().as_slice(), &[0]);
    }

    #[test]
    fn test_inconsistent_stats_are_rejected() {
        let err = ResequencePlan::from_stats(&[BatchStat::new(1, 1, 3, 0)], 2).unwrap_err();
        assert_eq!(err, ModelError::UnknownDocument { row: 0, doc_index: 3, num_docs: 2 });

        let err = ResequencePlan::from_stats(&[BatchStat::new(1, 1, 0, 0)], 2).unwrap_err();
        assert_eq!(err, ModelError::MissingDocument { doc_index: 1 });

        let dup = [BatchStat::new(1, 2, 0, 0), BatchStat::new(1, 2, 0, 0)];
        assert!(matches!(ResequencePlan::from_stats(&dup, 1), Err(ModelError::Data(_))));

        assert_eq!(ResequencePlan::from_stats(&[], 0).unwrap_err(), ModelError::EmptyBatch);
    }

    #[test]
    fn test_sentence_count_must_match_rows_of_the_document() {
        let mut stats = scenario_stats();
        stats[2].lr = 2;
        let err = ResequencePlan::from_stats(&stats, 3).unwrap_err();
        assert!(matches!(err, ModelError::Data(ref m) if m.contains("document 1")));

        let short = [BatchStat::new(3, 2, 0, 0)];
        assert!(matches!(ResequencePlan::from_stats(&short, 1), Err(ModelError::Data(_))));
    }

    #[test]
    fn test_apply_groups_sentences_and_restore_returns_document_order() {
        let device = Default::default();
        let plan   = ResequencePlan::from_stats(&scenario_stats(), 3).unwrap();

        // Sentence vector = [row + 1]
        let sentences = Tensor::<TestBackend, 2>::from_floats(
            [[1.0], [2.0], [3.0], [4.0], [5.0], [6.0]],
            &device,
        );
        let grouped = plan.apply(sentences).unwrap();
        assert_eq!(grouped.dims(), [3, 3, 1]);
        let values: Vec<f32> = grouped.into_data().iter::<f32>().collect();
        assert_eq!(values, vec![5.0, 6.0, 1.0, 4.0, 2.0, 0.0, 3.0, 0.0, 0.0]);

        // Document-level rows tagged by slot come back as A, B, C
        let per_slot = Tensor::<TestBackend, 2>::from_floats([[30.0], [10.0], [20.0]], &device);
        let restored: Vec<f32> = plan.restore(per_slot).into_data().iter::<f32>().collect();
        assert_eq!(restored, vec![10.0, 20.0, 30.0]);

        let caller = Tensor::<TestBackend, 2>::from_floats([[10.0], [20.0], [30.0]], &device);
        let slots: Vec<f32> = plan.reorder(caller).into_data().iter::<f32>().collect();
        assert_eq!(slots, vec![30.0, 10.0, 20.0]);
    }

    #[test]
    fn test_apply_rejects_wrong_row_count() {
        let device = Default::default();
        let plan   = ResequencePlan::from_stats(&scenario_stats(), 3).unwrap();
        let wrong  = Tensor::<TestBackend, 2>::zeros([5, 2], &device);
        assert!(matches!(plan.apply(wrong), Err(ModelError::Shape { .. })));
    }
}
