// ============================================================
// Layer 3 — Batch Row Metadata
// ============================================================
// Every sentence placed in a word-level batch carries a BatchStat.
// The word-level encoder sees sentences sorted by length, so the
// row index alone says nothing about where a sentence came from.
// The four numbers below are the only link back to the document:
//
//   ls          — true length of this sentence (tokens)
//   lr          — number of sentences in the parent document
//   doc_index   — position of the parent document in the batch
//   sent_index  — position of this sentence inside its document
//
// Everything downstream (resequencing, context lookup, restoring
// document order) is derived from these tuples alone.

use serde::{Deserialize, Serialize};

/// Identity of one word-level batch row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStat {
    pub ls:         usize,
    pub lr:         usize,
    pub doc_index:  usize,
    pub sent_index: usize,
}

impl BatchStat {
    pub fn new(ls: usize, lr: usize, doc_index: usize, sent_index: usize) -> Self {
        Self { ls, lr, doc_index, sent_index }
    }
}

// ─── Permutation ──────────────────────────────────────────────────────────────
/// A bijection over `0..len`, stored as `new position → old position`.
///
/// The inverse maps `old position → new position`, so
/// `inverse[order[k]] == k` for every `k`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Permutation(Vec<usize>);

impl Permutation {
    /// Wrap an index vector. Returns None unless it is a bijection on `0..len`.
    pub fn new(order: Vec<usize>) -> Option<Self> {
        let mut seen = vec![false; order.len()];
        for &i in &order {
            if i >= order.len() || seen[i] {
                return None;
            }
            seen[i] = true;
        }
        Some(Self(order))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn inverse(&self) -> Self {
        let mut inv = vec![0usize; self.0.len()];
        for (new_pos, &old_pos) in self.0.iter().enumerate() {
            inv[old_pos] = new_pos;
        }
        Self(inv)
    }

    /// True when `other[self[k]] == k` for all `k`.
    pub fn is_inverse_of(&self, other: &Permutation) -> bool {
        self.len() == other.len()
            && self.0.iter().enumerate().all(|(k, &i)| other.0[i] == k)
    }

    /// Indices as i32, the element type Burn uses for Int tensors.
    pub fn to_i32(&self) -> Vec<i32> {
        self.0.iter().map(|&i| i as i32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_bijections() {
        assert!(Permutation::new(vec![0, 0]).is_none());
        assert!(Permutation::new(vec![0, 2]).is_none());
        assert!(Permutation::new(vec![2, 0, 1]).is_some());
    }

    #[test]
    fn test_inverse_law() {
        let order = Permutation::new(vec![2, 0, 3, 1]).unwrap();
        let inv   = order.inverse();
        for k in 0..order.len() {
            assert_eq!(inv.as_slice()[order.as_slice()[k]], k);
        }
        assert!(order.is_inverse_of(&inv));
        assert!(inv.is_inverse_of(&order));
        assert!(!order.is_inverse_of(&order));
    }

    #[test]
    fn test_indices_convert_for_int_tensors() {
        let order = Permutation::new(vec![1, 2, 0]).unwrap();
        assert_eq!(order.to_i32(), vec![1, 2, 0]);
        assert_eq!(order.inverse().as_slice(), &[2, 0, 1]);
    }
}
