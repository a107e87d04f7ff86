// ============================================================
// Layer 6 — Vocabulary Store
// ============================================================
// The vocabulary is kept as a word-level HuggingFace tokenizer
// JSON so it can be saved next to the model weights and loaded
// back with `Tokenizer::from_file`. Token ids are meaningless
// without the matching vocabulary, so both always travel
// together in the checkpoint directory.
//
// Id layout:
//   0        [PAD]
//   1        [UNK]
//   2..      words, most frequent first (or embedding-file order)
//
// Normalisation is plain lower-casing and pre-tokenisation is
// the Whitespace splitter (`\w+|[^\w\s]+`). Word counting and
// pretrained-vector lookup run text through those same two steps
// (`word_pieces`), so every counted word can be encoded back.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokenizers::{
    normalizers::utils::Lowercase, pre_tokenizers::whitespace::Whitespace, NormalizedString, Normalizer,
    OffsetReferential, OffsetType, PreTokenizedString, PreTokenizer, Tokenizer,
};

use crate::data::segmenter::split_sentences;
use crate::domain::document::{PAD_ID, UNK_ID};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";

const TOKENIZER_FILE: &str = "tokenizer.json";

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(TOKENIZER_FILE)
    }

    /// Load a previously saved vocabulary.
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!(
                "Cannot load tokenizer from '{}': {}", path.display(), e
            ))
    }

    /// Count lower-cased words over `texts` and keep the `max_words`
    /// most frequent ones. Ties are broken alphabetically so the
    /// same corpus always yields the same ids.
    pub fn build_from_corpus<S: AsRef<str>>(&self, texts: &[S], max_words: usize) -> Result<Tokenizer> {
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for sentence in split_sentences(text.as_ref()) {
                for word in word_pieces(&sentence)? {
                    *freq.entry(word).or_insert(0) += 1;
                }
            }
        }

        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(max_words);

        tracing::info!("Vocabulary built from corpus: {} words (+2 reserved)", words.len());
        let words: Vec<String> = words.into_iter().map(|(w, _)| w).collect();
        self.build_from_words(&words)
    }

    /// Write a vocabulary giving `words[k]` the id `k + 2`.
    pub fn build_from_words(&self, words: &[String]) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let mut vocab = serde_json::Map::new();
        vocab.insert(PAD_TOKEN.to_string(), serde_json::json!(PAD_ID));
        vocab.insert(UNK_TOKEN.to_string(), serde_json::json!(UNK_ID));

        let mut next_id = UNK_ID + 1;
        for word in words {
            if !vocab.contains_key(word) {
                vocab.insert(word.clone(), serde_json::json!(next_id));
                next_id += 1;
            }
        }

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": PAD_ID, "content": PAD_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": UNK_ID, "content": UNK_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": { "type": "Lowercase" },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write tokenizer JSON to '{}'", path.display()))?;

        tracing::debug!("Vocabulary of {} ids saved to '{}'", next_id, path.display());
        self.load()
    }
}

/// Cut text into the lower-cased pieces the saved tokenizer looks up.
pub fn word_pieces(text: &str) -> Result<Vec<String>> {
    let mut normalized = NormalizedString::from(text);
    Lowercase
        .normalize(&mut normalized)
        .map_err(|e| anyhow::anyhow!("Normalisation error: {e}"))?;

    let mut pretokenized = PreTokenizedString::from(normalized.get());
    Whitespace::default()
        .pre_tokenize(&mut pretokenized)
        .map_err(|e| anyhow::anyhow!("Pre-tokenisation error: {e}"))?;

    Ok(pretokenized
        .get_splits(OffsetReferential::Original, OffsetType::Byte)
        .into_iter()
        .map(|(piece, _, _)| piece.to_string())
        .collect())
}
