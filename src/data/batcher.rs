// ============================================================
// Layer 4 — Hierarchical Batcher
// ============================================================
// Turns a mini-batch of tokenised documents into the word-level
// batch the sentence encoder consumes.
//
// Documents are ragged twice over: each has its own number of
// sentences, each sentence its own number of words. The word
// encoder works on sentences, so all sentences of all documents
// are flattened into one list of rows:
//
//   1. Trim: drop empty sentences, keep at most `max_sents`
//      sentences per document and `max_words` tokens per
//      sentence. A document left with nothing gets a single
//      [UNK] sentence so every document owns at least one row.
//   2. Sort rows by sentence length, longest first (packed
//      execution needs descending lengths). Ties: longer
//      document first, then document index, then sentence index.
//   3. Pad every row to the longest sentence with [PAD].
//   4. Attach a BatchStat to every row so later stages can find
//      the row's document and its position inside it.
//
// Example (three documents):
//   A = [3, 5] tokens,  B = [4],  C = [2, 2, 6]
//   rows by length: 6(C,2) 5(A,1) 4(B,0) 3(A,0) 2(C,0) 2(C,1)
//
// Trimming never fails and is fully deterministic. What it cut
// is reported in a TruncationReport instead of being silent.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::batch_stat::BatchStat;
use crate::domain::document::{Token, TokenizedDocument, PAD_ID, UNK_ID};

const UNK_SENTENCE: &[Token] = &[UNK_ID];

// ─── TrimLimits ───────────────────────────────────────────────────────────────
/// Per-document sentence cap and per-sentence token cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimLimits {
    pub max_sents: usize,
    pub max_words: usize,
}

impl TrimLimits {
    /// Both limits are raised to at least 1; a zero limit would empty
    /// every document.
    pub fn new(max_sents: usize, max_words: usize) -> Self {
        Self {
            max_sents: max_sents.max(1),
            max_words: max_words.max(1),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }
}

// ─── TruncationReport ─────────────────────────────────────────────────────────
/// What trimming removed from one batch (or, merged, from an epoch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncationReport {
    pub documents:             usize,
    pub documents_truncated:   usize,
    pub documents_substituted: usize,
    pub sentences_dropped:     usize,
    pub words_dropped:         usize,
}

impl TruncationReport {
    pub fn merge(&mut self, other: &TruncationReport) {
        self.documents             += other.documents;
        self.documents_truncated   += other.documents_truncated;
        self.documents_substituted += other.documents_substituted;
        self.sentences_dropped     += other.sentences_dropped;
        self.words_dropped         += other.words_dropped;
    }

    /// Fraction of documents that lost sentences or words.
    pub fn truncated_fraction(&self) -> f64 {
        if self.documents == 0 {
            return 0.0;
        }
        self.documents_truncated as f64 / self.documents as f64
    }
}

// ─── WordBatch ────────────────────────────────────────────────────────────────
/// The backend-independent word-level batch.
#[derive(Debug, Clone, PartialEq)]
pub struct WordBatch {
    /// Row-major `[rows, width]` token matrix, right-padded with PAD_ID
    pub tokens: Vec<Token>,
    pub rows:   usize,
    pub width:  usize,

    /// One entry per row, same order as `tokens`
    pub stats: Vec<BatchStat>,

    /// Number of documents the rows came from
    pub num_docs: usize,

    pub truncation: TruncationReport,
}

impl WordBatch {
    pub fn row(&self, i: usize) -> &[Token] {
        &self.tokens[i * self.width..(i + 1) * self.width]
    }

    pub fn lengths(&self) -> Vec<usize> {
        self.stats.iter().map(|s| s.ls).collect()
    }
}

/// Trim one document's sentences, recording what was dropped.
fn trim_document<'a>(
    sentences: &'a [Vec<Token>],
    limits:    TrimLimits,
    report:    &mut TruncationReport,
) -> Vec<&'a [Token]> {
    let non_empty: Vec<&[Token]> = sentences
        .iter()
        .filter(|s| !s.is_empty())
        .map(Vec::as_slice)
        .collect();

    let mut truncated = false;
    if non_empty.len() > limits.max_sents {
        report.sentences_dropped += non_empty.len() - limits.max_sents;
        truncated = true;
    }

    let kept: Vec<&[Token]> = non_empty
        .into_iter()
        .take(limits.max_sents)
        .map(|s| {
            if s.len() > limits.max_words {
                report.words_dropped += s.len() - limits.max_words;
                truncated = true;
                &s[..limits.max_words]
            } else {
                s
            }
        })
        .collect();

    report.documents += 1;
    if truncated {
        report.documents_truncated += 1;
    }
    if kept.is_empty() {
        report.documents_substituted += 1;
        return vec![UNK_SENTENCE];
    }
    kept
}

/// Flatten, sort and pad the sentences of `docs` into one word-level batch.
pub fn build_word_batch(docs: &[TokenizedDocument], limits: TrimLimits) -> WordBatch {
    let mut report = TruncationReport::default();

    let mut rows: Vec<(BatchStat, &[Token])> = Vec::new();
    for (doc_index, doc) in docs.iter().enumerate() {
        let sentences = trim_document(&doc.sentences, limits, &mut report);
        let lr        = sentences.len();
        for (sent_index, sentence) in sentences.into_iter().enumerate() {
            rows.push((BatchStat::new(sentence.len(), lr, doc_index, sent_index), sentence));
        }
    }

    // (doc_index, sent_index) is unique per row, so this is a total order.
    rows.sort_by(|(a, _), (b, _)| {
        b.ls.cmp(&a.ls)
            .then(b.lr.cmp(&a.lr))
            .then(a.doc_index.cmp(&b.doc_index))
            .then(a.sent_index.cmp(&b.sent_index))
    });

    let width      = rows.first().map(|(s, _)| s.ls).unwrap_or(0);
    let mut tokens = vec![PAD_ID; rows.len() * width];
    for (i, (_, sentence)) in rows.iter().enumerate() {
        tokens[i * width..i * width + sentence.len()].copy_from_slice(sentence);
    }

    if report.documents_truncated > 0 || report.documents_substituted > 0 {
        tracing::debug!(
            "Batch trimming: {} of {} documents truncated, {} substituted, {} sentences / {} words dropped",
            report.documents_truncated,
            report.documents,
            report.documents_substituted,
            report.sentences_dropped,
            report.words_dropped,
        );
    }

    WordBatch {
        tokens,
        rows: rows.len(),
        width,
        stats: rows.into_iter().map(|(s, _)| s).collect(),
        num_docs: docs.len(),
        truncation: report,
    }
}

// ─── ReviewBatch ──────────────────────────────────────────────────────────────
/// A word-level batch on a device, plus per-document labels and contexts.
///
/// `words` rows follow sentence-length order; `labels`, `users` and
/// `items` follow the caller's document order.
#[derive(Debug, Clone)]
pub struct ReviewBatch<B: Backend> {
    /// Token ids — shape: [total_sentences, max_sentence_len]
    pub words: Tensor<B, 2, Int>,

    /// Class ids — shape: [num_docs]
    pub labels: Tensor<B, 1, Int>,

    /// Context ids — shape: [num_docs]
    pub users: Tensor<B, 1, Int>,
    pub items: Tensor<B, 1, Int>,

    /// Row identities, parallel to `words`
    pub stats: Vec<BatchStat>,

    pub num_docs:   usize,
    pub truncation: TruncationReport,
}

// ─── ReviewBatcher ────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct ReviewBatcher<B: Backend> {
    pub device: B::Device,
    pub limits: TrimLimits,
}

impl<B: Backend> ReviewBatcher<B> {
    pub fn new(device: B::Device, limits: TrimLimits) -> Self {
        Self { device, limits }
    }

    pub fn batch_documents(&self, docs: &[TokenizedDocument]) -> ReviewBatch<B> {
        let wb = build_word_batch(docs, self.limits);

        let words_flat: Vec<i32> = wb.tokens.iter().map(|&t| t as i32).collect();
        let labels:     Vec<i32> = docs.iter().map(|d| d.label as i32).collect();
        let users:      Vec<i32> = docs.iter().map(|d| d.context.user as i32).collect();
        let items:      Vec<i32> = docs.iter().map(|d| d.context.item as i32).collect();

        let words = Tensor::<B, 1, Int>::from_ints(words_flat.as_slice(), &self.device)
            .reshape([wb.rows, wb.width]);

        ReviewBatch {
            words,
            labels: Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device),
            users:  Tensor::<B, 1, Int>::from_ints(users.as_slice(), &self.device),
            items:  Tensor::<B, 1, Int>::from_ints(items.as_slice(), &self.device),
            stats:  wb.stats,
            num_docs:   wb.num_docs,
            truncation: wb.truncation,
        }
    }
}

impl<B: Backend> Batcher<TokenizedDocument, ReviewBatch<B>> for ReviewBatcher<B> {
    fn batch(&self, items: Vec<TokenizedDocument>) -> ReviewBatch<B> {
        self.batch_documents(&items)
    }
}
