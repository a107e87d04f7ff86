// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a JSON-lines review file to device-ready
// word-level batches:
//
//   reviews.jsonl
//       │
//       ▼
//   JsonlLoader       → RawReview per line
//       │
//       ▼
//   splitter          → train / validation / test
//       │
//       ▼
//   ModelMaps         → label, user and item ids
//       │
//       ▼
//   Vectorizer        → sentences → token ids (via segmenter)
//       │
//       ▼
//   ReviewDataset     → Burn Dataset (BalancedDataset view optional)
//       │
//       ▼
//   ReviewBatcher     → trimmed, length-sorted word batch + BatchStats
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads labelled reviews from JSON lines
pub mod loader;

/// Rule-based sentence and word splitting
pub mod segmenter;

/// Label / context id maps and class statistics
pub mod mappings;

/// Text → sentences of token ids
pub mod vectorizer;

/// Implements Burn's Dataset trait for tokenised documents
pub mod dataset;

/// Class-balanced view over a dataset
pub mod sampler;

/// Builds the sorted, padded word-level batch
pub mod batcher;

/// Fold-based and random splits
pub mod splitter;
