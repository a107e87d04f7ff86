// ============================================================
// Layer 6 — Pretrained Word Embeddings
// ============================================================
// Reads word2vec text files:
//
//   <word count> <dimension>
//   word v1 v2 ... vd
//   ...
//
// The resulting table has two extra leading rows, both zero:
// row 0 for [PAD] and row 1 for [UNK]. Word k of the file (in
// file order, counting only well-formed lines) gets row k + 2,
// which is exactly the id TokenizerStore::build_from_words
// assigns, so the two can be built from the same word list.
//
// Words are lower-cased and checked against the tokenizer's
// pre-tokenizer, so every stored word is one the vocabulary can
// actually hand back ("Good" becomes "good"; "don't", which the
// tokenizer splits in three, is skipped with a warning).
//
// Malformed lines (wrong number of values, unparsable floats)
// are skipped with a warning. Repeated words, including ones that
// only collide after lower-casing, keep their first vector. The
// reserved token strings are never taken from a file.

use anyhow::{bail, Context, Result};
use burn::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::infra::tokenizer_store::{word_pieces, PAD_TOKEN, UNK_TOKEN};

const RESERVED_ROWS: usize = 2;

#[derive(Debug, Clone)]
pub struct PretrainedEmbeddings {
    /// Word for row k + 2
    pub words: Vec<String>,
    pub dim:   usize,
    /// Row-major, (words.len() + 2) x dim
    values:    Vec<f32>,
}

impl PretrainedEmbeddings {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open embedding file '{}'", path.display()))?;
        let embeddings = Self::parse(BufReader::new(file))
            .with_context(|| format!("Cannot read embeddings from '{}'", path.display()))?;

        tracing::info!(
            "Loaded {} pretrained vectors of dimension {} from '{}'",
            embeddings.words.len(),
            embeddings.dim,
            path.display()
        );
        Ok(embeddings)
    }

    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header = lines.next().context("embedding file is empty")??;
        let mut fields = header.split_whitespace();
        let (count, dim) = match (fields.next(), fields.next(), fields.next()) {
            (Some(c), Some(d), None) => (
                c.parse::<usize>().with_context(|| format!("bad word count in header '{header}'"))?,
                d.parse::<usize>().with_context(|| format!("bad dimension in header '{header}'"))?,
            ),
            _ => bail!("expected a '<count> <dimension>' header, got '{header}'"),
        };
        if dim == 0 {
            bail!("embedding dimension must be positive");
        }

        let mut words  = Vec::with_capacity(count);
        let mut values = vec![0.0f32; RESERVED_ROWS * dim];
        let mut seen   = HashSet::with_capacity(count);
        let mut malformed = 0usize;
        let mut split     = 0usize;

        for (number, line) in lines.enumerate() {
            let line = line?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else { continue };

            let vector: Option<Vec<f32>> = parts.map(|v| v.parse::<f32>().ok()).collect();
            let vector = match vector {
                Some(v) if v.len() == dim => v,
                _ => {
                    malformed += 1;
                    tracing::warn!("Skipping malformed embedding line {}: '{}'", number + 2, truncate(&line));
                    continue;
                }
            };
            if word == PAD_TOKEN || word == UNK_TOKEN {
                continue;
            }
            let mut pieces = word_pieces(word)?;
            let word = match (pieces.pop(), pieces.is_empty()) {
                (Some(piece), true) => piece,
                _ => {
                    split += 1;
                    tracing::warn!("Skipping embedding for '{}': the tokenizer never yields it whole", word);
                    continue;
                }
            };
            if !seen.insert(word.clone()) {
                continue;
            }

            words.push(word);
            values.extend_from_slice(&vector);
        }

        if words.len() != count {
            tracing::warn!(
                "Header announced {} words but {} were usable ({} malformed lines, {} unreachable words)",
                count,
                words.len(),
                malformed,
                split
            );
        }

        Ok(Self { words, dim, values })
    }

    /// Rows in the table, reserved rows included.
    pub fn rows(&self) -> usize {
        self.words.len() + RESERVED_ROWS
    }

    pub fn row(&self, id: usize) -> &[f32] {
        &self.values[id * self.dim..(id + 1) * self.dim]
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        Tensor::<B, 1>::from_floats(self.values.as_slice(), device).reshape([self.rows(), self.dim])
    }
}

fn truncate(line: &str) -> String {
    line.chars().take(60).collect()
}
