// ============================================================
// Layer 3 — Review Domain Types
// ============================================================
// A review travels through two shapes:
//
//   RawReview          — text + label + optional user/item, as read
//                        from the dataset file
//   TokenizedDocument  — sentences of token ids + dense class id +
//                        dense context ids, ready for batching
//
// Token ids 0 and 1 are reserved across the whole system:
//   0 → padding, never a real word
//   1 → unknown / out-of-vocabulary word

use serde::{Deserialize, Serialize};

/// A single token id.
pub type Token = u32;

/// Reserved id for padding positions.
pub const PAD_ID: Token = 0;

/// Reserved id for out-of-vocabulary words.
pub const UNK_ID: Token = 1;

/// A review exactly as it appears in the dataset file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawReview {
    /// Free text of the review
    pub text: String,

    /// Class label as written in the dataset (e.g. a star rating)
    pub label: i64,

    /// Author identity, used to bias attention
    #[serde(default)]
    pub user: Option<String>,

    /// Reviewed product identity, used to bias attention
    #[serde(default)]
    pub item: Option<String>,

    /// Cross-validation fold this review belongs to
    #[serde(default)]
    pub fold: Option<usize>,
}

impl RawReview {
    pub fn new(text: impl Into<String>, label: i64) -> Self {
        Self {
            text:  text.into(),
            label,
            user:  None,
            item:  None,
            fold:  None,
        }
    }

    pub fn with_context(mut self, user: impl Into<String>, item: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.item = Some(item.into());
        self
    }

    pub fn with_fold(mut self, fold: usize) -> Self {
        self.fold = Some(fold);
        self
    }
}

/// Dense context ids for the (user, item) pair.
/// Id 0 in either slot means "no context known".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextIds {
    pub user: usize,
    pub item: usize,
}

impl ContextIds {
    pub fn new(user: usize, item: usize) -> Self {
        Self { user, item }
    }
}

/// A review after vectorisation: ordered sentences of token ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizedDocument {
    pub sentences: Vec<Vec<Token>>,
    pub label:     usize,
    pub context:   ContextIds,
}

impl TokenizedDocument {
    pub fn new(sentences: Vec<Vec<Token>>, label: usize) -> Self {
        Self { sentences, label, context: ContextIds::default() }
    }

    pub fn with_context(mut self, context: ContextIds) -> Self {
        self.context = context;
        self
    }

    pub fn sentence_count(&self) -> usize {
        self.sentences.len()
    }

    pub fn token_count(&self) -> usize {
        self.sentences.iter().map(Vec::len).sum()
    }
}
