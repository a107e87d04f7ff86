// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several other layers:
//
//   checkpoint.rs      — weights (CompactRecorder) plus the JSON
//                        side files that make them usable
//   tokenizer_store.rs — word-level vocabulary persistence
//   embeddings.rs      — word2vec text loader
//   capacity.rs        — pre-flight memory estimate
//   metrics.rs         — per-epoch CSV log

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary building, saving, and loading
pub mod tokenizer_store;

/// Pretrained word vectors
pub mod embeddings;

/// Batch memory estimate
pub mod capacity;

/// Training metrics CSV logger
pub mod metrics;
