// ============================================================
// Layer 6 — Pre-flight Capacity Check
// ============================================================
// Before training starts, estimate the memory the largest
// possible batch needs and refuse to start if it would not fit.
//
// The dominant buffer is the embedded word batch together with
// its bidirectional GRU activations, roughly
//
//   (2, batch, max_sents, max_words, embed) f32
//
// plus one (batch, max_sents, max_words) f32 buffer for the
// token grid. The check is an estimate, not an allocation.

use anyhow::{bail, Result};

const F32_BYTES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityEstimate {
    pub shape: [usize; 5],
    pub bytes: u64,
}

impl CapacityEstimate {
    pub fn for_batch(batch: usize, max_sents: usize, max_words: usize, embed: usize) -> Option<Self> {
        let shape = [2, batch, max_sents, max_words, embed];
        let grid  = (batch as u64)
            .checked_mul(max_sents as u64)?
            .checked_mul(max_words as u64)?;
        let activations = grid.checked_mul(2)?.checked_mul(embed as u64)?;
        let bytes = activations.checked_add(grid)?.checked_mul(F32_BYTES)?;
        Some(Self { shape, bytes })
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Fail when the estimated batch footprint exceeds `budget_mb` megabytes.
pub fn check_capacity(
    batch:     usize,
    max_sents: usize,
    max_words: usize,
    embed:     usize,
    budget_mb: u64,
) -> Result<CapacityEstimate> {
    let Some(estimate) = CapacityEstimate::for_batch(batch, max_sents, max_words, embed) else {
        bail!("Batch shape {:?} is too large to even estimate", [2, batch, max_sents, max_words, embed]);
    };

    let budget = budget_mb.saturating_mul(1024 * 1024);
    if estimate.bytes > budget {
        bail!(
            "Not enough memory for batch shape {:?}: needs about {:.1} MB, budget is {} MB. \
             Try lowering --max-sents, --max-words or --batch-size.",
            estimate.shape,
            estimate.megabytes(),
            budget_mb
        );
    }

    tracing::info!(
        "Memory check OK: batch shape {:?} needs about {:.1} MB of {} MB",
        estimate.shape,
        estimate.megabytes(),
        budget_mb
    );
    Ok(estimate)
}
