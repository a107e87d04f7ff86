// ============================================================
// Layer 5 — Sequence Encoder
// ============================================================
// One level of the hierarchy: a packed bidirectional GRU whose
// hidden states are pooled by context-conditioned attention.
//
//   x [B, T, E] ──GRU──▶ h [B, T', 2H] ──attention(u, i)──▶ α [B, T']
//                                       Σ_t α[t] h[t] ─────▶ [B, 2H]
//
// T' is the longest real length (lengths[0]); any extra padded
// columns of x are never looked at.
//
// The same module runs at word level (sentences of words) and at
// sentence level (documents of sentence vectors). The contexts
// are fed straight into the attention projections, so they must
// already be 2H wide.

use burn::prelude::*;

use crate::ml::attention::{AdditiveAttention, AdditiveAttentionConfig, MaskBuffer};
use crate::ml::error::ModelError;
use crate::ml::gru::{packed_batch_sizes, PackedBiGru, PackedGruConfig};

#[derive(Config, Debug)]
pub struct SequenceEncoderConfig {
    pub input_size:   usize,
    /// Per direction; the encoder output is twice this.
    pub hidden_size:  usize,
    pub context_size: usize,
}

impl SequenceEncoderConfig {
    pub fn output_size(&self) -> usize {
        2 * self.hidden_size
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<SequenceEncoder<B>, ModelError> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err(ModelError::Config(format!(
                "encoder sizes must be positive (input {}, hidden {})",
                self.input_size, self.hidden_size
            )));
        }
        if self.context_size != self.output_size() {
            return Err(ModelError::Config(format!(
                "context size {} does not match the bidirectional hidden size 2 x {} = {}",
                self.context_size,
                self.hidden_size,
                self.output_size()
            )));
        }

        Ok(SequenceEncoder {
            gru:         PackedGruConfig::new(self.input_size, self.hidden_size).init(device),
            attention:   AdditiveAttentionConfig::new(self.output_size(), self.context_size).init(device),
            input_size:  self.input_size,
            output_size: self.output_size(),
        })
    }
}

#[derive(Module, Debug)]
pub struct SequenceEncoder<B: Backend> {
    pub gru:         PackedBiGru<B>,
    pub attention:   AdditiveAttention<B>,
    pub input_size:  usize,
    pub output_size: usize,
}

/// Pooled vectors plus the attention that produced them.
#[derive(Debug, Clone)]
pub struct EncoderOutput<B: Backend> {
    /// [B, 2H]
    pub pooled:  Tensor<B, 2>,
    /// [B, lengths[0]], zero past each row's length
    pub weights: Tensor<B, 2>,
}

impl<B: Backend> SequenceEncoder<B> {
    /// Encode a length-sorted batch.
    ///
    /// `lengths` must be non-increasing and every entry at least 1.
    /// `mask` is scratch space; its contents are replaced.
    pub fn forward(
        &self,
        x:       Tensor<B, 3>,
        lengths: &[usize],
        users:   Tensor<B, 2>,
        items:   Tensor<B, 2>,
        mask:    &mut MaskBuffer,
    ) -> Result<EncoderOutput<B>, ModelError> {
        let [batch, time, width] = x.dims();
        self.validate(batch, time, width, lengths)?;

        let context_shape = [batch, self.output_size];
        for (what, ctx) in [("user context", &users), ("item context", &items)] {
            if ctx.dims() != context_shape {
                return Err(ModelError::Shape {
                    what,
                    expected: context_shape.to_vec(),
                    actual:   ctx.dims().to_vec(),
                });
            }
        }

        let steps  = lengths[0];
        let device = x.device();
        let x      = if steps < time { x.slice([0..batch, 0..steps, 0..width]) } else { x };

        let hidden  = self.gru.run(x, &packed_batch_sizes(lengths));
        let mask    = mask.tensor::<B>(lengths, steps, &device);
        let weights = self.attention.forward(hidden.clone(), users, items, mask);

        let pooled = (hidden * weights.clone().unsqueeze_dim::<3>(2))
            .sum_dim(1)
            .reshape([batch, self.output_size]);

        Ok(EncoderOutput { pooled, weights })
    }

    fn validate(&self, batch: usize, time: usize, width: usize, lengths: &[usize]) -> Result<(), ModelError> {
        if batch == 0 {
            return Err(ModelError::EmptyBatch);
        }
        if lengths.len() != batch {
            return Err(ModelError::Shape {
                what:     "sequence lengths",
                expected: vec![batch],
                actual:   vec![lengths.len()],
            });
        }
        if width != self.input_size {
            return Err(ModelError::Shape {
                what:     "encoder input",
                expected: vec![batch, time, self.input_size],
                actual:   vec![batch, time, width],
            });
        }

        for (index, &length) in lengths.iter().enumerate() {
            if length == 0 {
                return Err(ModelError::EmptySequence { index });
            }
            if index > 0 && length > lengths[index - 1] {
                return Err(ModelError::UnsortedLengths { index });
            }
            if length > time {
                return Err(ModelError::LengthOverflow { index, length, max: time });
            }
        }
        Ok(())
    }
}
