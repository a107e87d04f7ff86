// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to data sources and text
// vectorisers through these traits only, so a different file
// format or tokenizer can be dropped in without touching the
// training workflow.

use anyhow::Result;

use crate::domain::document::{RawReview, Token};

// ─── ReviewSource ─────────────────────────────────────────────────────────────
/// Any component that can load labelled reviews.
///
/// Implementations:
///   - JsonlLoader → one JSON object per line
pub trait ReviewSource {
    fn load_all(&self) -> Result<Vec<RawReview>>;
}

// ─── SentenceEncoder ──────────────────────────────────────────────────────────
/// Turns raw text into sentences of token ids.
///
/// Implementations:
///   - Vectorizer → rule-based sentence split + word-level tokenizer
pub trait SentenceEncoder {
    /// Returns at least one non-empty sentence for any input.
    fn encode_document(&self, text: &str) -> Result<Vec<Vec<Token>>>;
}
