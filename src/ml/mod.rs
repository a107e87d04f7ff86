// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// The numeric core. Everything here that can fail on bad input
// returns ModelError; the training and inference drivers wrap
// it into anyhow errors.
//
//   gru.rs          — packed bidirectional GRU (active-prefix stepping)
//   attention.rs    — context-conditioned additive attention, masked softmax
//   encoder.rs      — GRU + attention pooling, used at word and sentence level
//   resequencer.rs  — sentence vectors → per-document batch and back
//   model.rs        — the two-level classifier
//   trainer.rs      — training loop, evaluation, checkpointing
//   inferencer.rs   — classify raw text with a checkpoint
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Yang et al. (2016) Hierarchical Attention Networks

pub mod error;

pub mod gru;

pub mod attention;

pub mod encoder;

pub mod resequencer;

/// Hierarchical attention classifier
pub mod model;

/// Training loop with evaluation and checkpointing
pub mod trainer;

/// Inference engine — loads a checkpoint and classifies texts
pub mod inferencer;
