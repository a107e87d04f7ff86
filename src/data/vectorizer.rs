// ============================================================
// Layer 4 — Vectorizer
// ============================================================
// Raw review text → sentences of token ids.
//
//   text ──split_sentences──▶ sentences ──tokenizer──▶ ids
//
// Sentences that produce no ids are dropped; a review that
// produces no sentence at all becomes a single [UNK] sentence,
// so every TokenizedDocument satisfies "at least one non-empty
// sentence". Length limits are NOT applied here: trimming is the
// batcher's job, so the stored dataset keeps full documents.

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::data::mappings::ModelMaps;
use crate::data::segmenter::split_sentences;
use crate::domain::document::{ContextIds, RawReview, Token, TokenizedDocument, UNK_ID};
use crate::domain::traits::SentenceEncoder;

pub struct Vectorizer {
    tokenizer: Tokenizer,
}

/// One sentence as it appeared in the text, with its ids.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSentence {
    pub text: String,
    pub ids:  Vec<Token>,
}

impl Vectorizer {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    /// Vectorise labelled reviews. Reviews whose label is not in the
    /// label map (a class never seen in training) are skipped.
    pub fn vectorize(&self, reviews: &[RawReview], maps: &ModelMaps) -> Result<Vec<TokenizedDocument>> {
        let mut docs    = Vec::with_capacity(reviews.len());
        let mut skipped = 0usize;

        for review in reviews {
            let Some(class) = maps.labels.class_of(review.label) else {
                skipped += 1;
                continue;
            };
            let context = ContextIds::new(
                maps.users.id_of(review.user.as_deref()),
                maps.items.id_of(review.item.as_deref()),
            );
            let sentences = self.encode_document(&review.text)?;
            docs.push(TokenizedDocument::new(sentences, class).with_context(context));
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} reviews with labels unknown to the model", skipped);
        }
        Ok(docs)
    }

    /// Like `encode_document`, keeping each retained sentence's text.
    pub fn encode_sentences(&self, text: &str) -> Result<Vec<EncodedSentence>> {
        let mut sentences = Vec::new();
        for sentence in split_sentences(text) {
            let enc = self
                .tokenizer
                .encode(sentence.as_str(), false)
                .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
            if !enc.get_ids().is_empty() {
                sentences.push(EncodedSentence { ids: enc.get_ids().to_vec(), text: sentence });
            }
        }
        if sentences.is_empty() {
            sentences.push(EncodedSentence { text: String::new(), ids: vec![UNK_ID] });
        }
        Ok(sentences)
    }
}

impl SentenceEncoder for Vectorizer {
    fn encode_document(&self, text: &str) -> Result<Vec<Vec<Token>>> {
        Ok(self.encode_sentences(text)?.into_iter().map(|s| s.ids).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mappings::{ContextMap, LabelMap};
    use crate::infra::tokenizer_store::TokenizerStore;

    fn vectorizer(dir: &std::path::Path) -> Vectorizer {
        let store = TokenizerStore::new(dir);
        let words: Vec<String> = ["great", "phone", "bad", "."].iter().map(|w| w.to_string()).collect();
        Vectorizer::new(store.build_from_words(&words).unwrap())
    }

    #[test]
    fn test_sentences_become_id_lists() {
        let dir = tempfile::tempdir().unwrap();
        let v   = vectorizer(dir.path());
        let s   = v.encode_document("Great phone. Bad battery.").unwrap();
        assert_eq!(s, vec![vec![2, 3, 5], vec![4, UNK_ID, 5]]);
    }

    #[test]
    fn test_sentence_text_is_kept_alongside_ids() {
        let dir = tempfile::tempdir().unwrap();
        let v   = vectorizer(dir.path());
        let s   = v.encode_sentences("Great phone!\n\n").unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].text, "Great phone!");
        assert_eq!(s[0].ids, vec![2, 3, UNK_ID]);
    }

    #[test]
    fn test_empty_text_becomes_single_unknown_sentence() {
        let dir = tempfile::tempdir().unwrap();
        let v   = vectorizer(dir.path());
        assert_eq!(v.encode_document("   ").unwrap(), vec![vec![UNK_ID]]);
    }

    #[test]
    fn test_vectorize_maps_labels_and_contexts() {
        let dir     = tempfile::tempdir().unwrap();
        let v       = vectorizer(dir.path());
        let reviews = vec![
            RawReview::new("great", 5).with_context("u1", "i1"),
            RawReview::new("bad", 1),
            RawReview::new("meh", 3),
        ];
        let maps = ModelMaps {
            labels: LabelMap::build([1, 5]),
            users:  ContextMap::build([Some("u1")]),
            items:  ContextMap::build([Some("i1")]),
        };

        let docs = v.vectorize(&reviews, &maps).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].label, 1);
        assert_eq!(docs[0].context, ContextIds::new(1, 1));
        assert_eq!(docs[1].label, 0);
        assert_eq!(docs[1].context, ContextIds::default());
    }
}
